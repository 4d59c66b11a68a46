//! 核心层：错误类型与组件装配

pub mod builder;
pub mod error;

pub use builder::ChatBuilder;
pub use error::ChatError;
