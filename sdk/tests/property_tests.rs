use proptest::prelude::*;
use sdk::errors::{BrainErrorExt, EngineError};
use sdk::{Rejection, ToolOutput};

proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*") {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::ServiceOffline(error_str.clone()),
            EngineError::LLMProvider(error_str.clone()),
            EngineError::Persistence(error_str.clone()),
            EngineError::ToolNotFound(error_str.clone()),
            EngineError::ToolError(error_str.clone()),
            EngineError::PathOutsideWorkspace(std::path::PathBuf::from(&error_str)),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn test_rejection_value_is_always_blocked(message in "\\PC*") {
        let value = Rejection::new(message.clone()).to_value();
        prop_assert_eq!(value["blocked"].as_bool(), Some(true));
        prop_assert_eq!(value["message"].as_str(), Some(message.as_str()));
    }

    #[test]
    fn test_error_output_is_never_successful(message in "\\PC*") {
        let output = ToolOutput::error(message.clone());
        prop_assert!(!output.success);
        prop_assert_eq!(output.error.as_deref(), Some(message.as_str()));
    }
}
