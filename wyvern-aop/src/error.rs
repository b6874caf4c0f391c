//! 错误类型定义
//!
//! 配置期错误使用封闭的 `AopError` 枚举，调用链执行期错误统一使用
//! `anyhow::Error` 透传，便于异常通知按具体错误类型做 downcast 匹配

use thiserror::Error;

/// AOP 配置期错误
///
/// 这些错误属于配置缺陷，应当在装配阶段立即失败，而不是等到第一次
/// 真实调用时才暴露
#[derive(Debug, Error)]
pub enum AopError {
    /// 无法识别的通知形态（没有任何适配器支持）
    #[error("Unrecognized advice type: {0}")]
    UnknownAdviceType(String),

    /// 代理构建失败
    ///
    /// 既然已判定需要通知，就决不能悄悄返回未代理的原始实例
    #[error("Failed to create proxy for '{type_name}': {reason}")]
    ProxyCreation { type_name: String, reason: String },

    /// 配置已冻结，拒绝修改
    #[error("Proxy configuration is frozen: {0}")]
    ConfigurationFrozen(String),

    /// 指定的 Advisor 不存在
    #[error("Advisor not found: '{0}'")]
    AdvisorNotFound(String),

    /// 代理上不存在该方法
    #[error("Unknown method '{method}' on proxy for '{type_name}'")]
    UnknownMethod { type_name: String, method: String },

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// AOP 配置期结果
pub type AopResult<T> = std::result::Result<T, AopError>;

/// 结构化的错误信息
///
/// 在异常通知与诊断日志中传递比单条消息更丰富的错误快照
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// 错误消息
    pub message: String,

    /// 错误源链（cause chain）
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    /// 从链路执行错误创建 ErrorInfo
    pub fn from_error(error: &anyhow::Error) -> Self {
        let mut chain = error.chain();
        let message = chain
            .next()
            .map(|e| e.to_string())
            .unwrap_or_else(|| error.to_string());
        let source_chain = chain.map(|source| source.to_string()).collect();

        Self {
            message,
            source_chain,
        }
    }

    /// 创建简单的 ErrorInfo（只包含消息）
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source_chain: Vec::new(),
        }
    }

    /// 获取完整的错误描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!(
                "{}\nCaused by:\n  {}",
                self.message,
                self.source_chain.join("\n  ")
            )
        }
    }
}
