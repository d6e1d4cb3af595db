use std::io;

use crate::http::spotify::client::ClientConnectionHandlingError;

#[derive(Debug)]
pub enum SkipwardenError {
    IoError(io::Error),
    ClientError(ClientConnectionHandlingError),
    GenericError(String),
}

impl From<io::Error> for SkipwardenError {
    fn from(error: io::Error) -> Self {
        SkipwardenError::IoError(error)
    }
}

impl From<ClientConnectionHandlingError> for SkipwardenError {
    fn from(error: ClientConnectionHandlingError) -> Self {
        SkipwardenError::ClientError(error)
    }
}

impl From<String> for SkipwardenError {
    fn from(error: String) -> Self {
        SkipwardenError::GenericError(error)
    }
}
