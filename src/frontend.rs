use std::collections::VecDeque;
use std::sync::mpsc::Receiver;

use ndarray::Array1;

use crate::error::SearchError;

/// One feature vector produced by the front-end.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    pub index: usize,
    pub values: Array1<f32>,
}

/// A single item pulled from the front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    SpeechStart,
    Features(FeatureFrame),
    /// Soft end-of-speech marker; the stream may still deliver a `DataEnd`.
    SpeechEnd,
    /// Hard end-of-stream marker.
    DataEnd,
}

/// Pull-based feature stream. `next_data` may block; `Ok(None)` means the
/// source has nothing left.
pub trait FeatureSource: Send {
    fn next_data(&mut self) -> Result<Option<Data>, SearchError>;
}

impl<T: FeatureSource + ?Sized> FeatureSource for Box<T> {
    fn next_data(&mut self) -> Result<Option<Data>, SearchError> {
        (**self).next_data()
    }
}

/// Front-end output that has already been computed. Once the queue is empty
/// it yields a closing `DataEnd` unless the last item already was one.
#[derive(Debug, Default)]
pub struct VecFeatureSource {
    items: VecDeque<Data>,
    data_ended: bool,
}

impl VecFeatureSource {
    pub fn new(items: impl IntoIterator<Item = Data>) -> Self {
        Self {
            items: items.into_iter().collect(),
            data_ended: false,
        }
    }

    /// Wraps raw frames as one utterance: start, numbered frames, data end.
    pub fn from_frames(frames: impl IntoIterator<Item = Vec<f32>>) -> Self {
        let mut items = VecDeque::new();
        items.push_back(Data::SpeechStart);
        items.extend(frames.into_iter().enumerate().map(|(index, values)| {
            Data::Features(FeatureFrame {
                index,
                values: Array1::from_vec(values),
            })
        }));
        items.push_back(Data::DataEnd);
        Self {
            items,
            data_ended: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

impl FeatureSource for VecFeatureSource {
    fn next_data(&mut self) -> Result<Option<Data>, SearchError> {
        let next = self.items.pop_front();
        Ok(close_stream(next, &mut self.data_ended))
    }
}

/// Feature stream fed by another thread. Blocks until the producer sends or
/// hangs up; a hang-up ends the stream with a `DataEnd`.
pub struct ChannelFeatureSource {
    rx: Receiver<Data>,
    data_ended: bool,
}

impl ChannelFeatureSource {
    pub fn new(rx: Receiver<Data>) -> Self {
        Self {
            rx,
            data_ended: false,
        }
    }
}

impl FeatureSource for ChannelFeatureSource {
    fn next_data(&mut self) -> Result<Option<Data>, SearchError> {
        let next = match self.rx.recv() {
            Ok(data) => Some(data),
            Err(_) => {
                if !self.data_ended {
                    log::debug!("Feature channel closed");
                }
                None
            }
        };
        Ok(close_stream(next, &mut self.data_ended))
    }
}

/// Passes `next` through. On exhaustion, yields one `DataEnd` unless the last
/// item delivered already was one.
fn close_stream(next: Option<Data>, data_ended: &mut bool) -> Option<Data> {
    match next {
        Some(data) => {
            *data_ended = matches!(data, Data::DataEnd);
            Some(data)
        }
        None if !*data_ended => {
            *data_ended = true;
            Some(Data::DataEnd)
        }
        None => None,
    }
}
