use super::{AttackError, ClusterError, ConfigError, ValidationError};

impl From<&'static str> for ValidationError {
    fn from(message: &'static str) -> Self {
        ValidationError::TestExpectation { message }
    }
}

impl From<String> for ValidationError {
    fn from(value: String) -> Self {
        ValidationError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for ConfigError {
    fn from(message: &'static str) -> Self {
        ConfigError::TestExpectation { message }
    }
}

impl From<String> for ConfigError {
    fn from(value: String) -> Self {
        ConfigError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for ClusterError {
    fn from(message: &'static str) -> Self {
        ClusterError::TestExpectation { message }
    }
}

impl From<String> for ClusterError {
    fn from(value: String) -> Self {
        ClusterError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for AttackError {
    fn from(message: &'static str) -> Self {
        AttackError::TestExpectation { message }
    }
}

impl From<String> for AttackError {
    fn from(value: String) -> Self {
        AttackError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}
