//! 领域模型错误定义
//!
//! 定义了领域层与持久化协作方可能返回的错误类型。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 身份解析失败（会话不存在或上游出错）
    #[error("身份解析失败: {message}")]
    IdentityError { message: String },
}

impl DomainError {
    pub fn identity_error(message: impl Into<String>) -> Self {
        Self::IdentityError {
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 持久化存储错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    /// 底层存储读写失败
    #[error("storage error: {message}")]
    Storage { message: String },

    /// 存储中的数据无法还原为领域对象
    #[error("invalid stored data: {message}")]
    InvalidData { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }
}
