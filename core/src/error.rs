use std::error;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    InvalidFunction(std::string::String),
    InvalidQuality(std::string::String),
    InvalidRange(std::string::String),
    InvalidBucket(std::string::String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CoreError::InvalidFunction(msg) => write!(f, "Invalid aggregate function: {}", msg),
            CoreError::InvalidQuality(msg) => write!(f, "Invalid quality flag: {}", msg),
            CoreError::InvalidRange(msg) => write!(f, "Invalid time range: {}", msg),
            CoreError::InvalidBucket(msg) => write!(f, "Invalid bucket size: {}", msg),
        }
    }
}

impl error::Error for CoreError {}
