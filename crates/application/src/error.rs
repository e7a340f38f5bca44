use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("completion gateway error: {0}")]
    Gateway(#[from] GatewayError),
    /// 已认证但不是房间成员。不区分房间是否存在。
    #[error("forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid message type: {0}")]
    InvalidMessageType(&'static str),
}

impl ApplicationError {
    /// 把仓储层的 NotFound 翻译成带资源名的 NotFound
    pub fn from_repository(error: RepositoryError, resource: &'static str) -> Self {
        match error {
            RepositoryError::NotFound => ApplicationError::NotFound(resource),
            other => ApplicationError::Repository(other),
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::from_repository(value, "record")
    }
}
