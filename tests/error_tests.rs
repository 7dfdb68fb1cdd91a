use phonebeam_lib::SearchError;

#[test]
fn io_error_user_message() {
    let err = SearchError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
    assert!(err.user_message().contains("model files"));
    assert!(err.is_setup_error());
}

#[test]
fn invalid_model_user_message() {
    let err = SearchError::InvalidModel("bad matrix".to_string());
    assert!(err.user_message().contains("malformed"));
    assert!(err.to_string().contains("bad matrix"));
}

#[test]
fn feature_dimension_is_a_data_error() {
    let err = SearchError::FeatureDimension {
        expected: 13,
        actual: 39,
    };
    assert!(!err.is_setup_error());
    assert!(err.user_message().contains("front-end"));
    assert_eq!(err.to_string(), "Feature frame has 39 values, expected 13");
}

#[test]
fn front_end_failure_abandons_the_utterance() {
    let err = SearchError::FrontEnd("device unplugged".to_string());
    assert!(!err.is_setup_error());
    assert!(err.user_message().contains("abandoned"));
}

#[test]
fn not_allocated_user_message() {
    let err = SearchError::NotAllocated;
    assert!(err.is_setup_error());
    assert!(err.user_message().contains("allocated"));
}
