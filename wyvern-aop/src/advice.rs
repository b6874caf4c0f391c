//! 通知（Advice）模型
//!
//! 横切行为的几种形态以封闭的标签变体表示，在配置期经适配器
//! 注册表统一规范化为拦截器，而不是用继承层次建模

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::contract::{AnyRef, MethodDescriptor};
use crate::invocation::MethodInterceptor;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdviceType {
    /// 前置通知
    Before,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（调用抛出错误时执行）
    AfterThrowing,
    /// 环绕通知（可以控制方法执行）
    Around,
    /// 扩展通知（由注册的适配器识别）
    Custom,
}

/// 前置通知 Trait
///
/// 在目标方法执行前调用。不能修改参数，也不能跳过目标调用；
/// 返回错误会以正常的错误传播中止本次调用
pub trait BeforeAdvice: Send + Sync {
    /// 获取通知名称
    fn name(&self) -> &str {
        "BeforeAdvice"
    }

    /// 执行前置通知
    fn before(
        &self,
        method: &MethodDescriptor,
        args: &[AnyRef],
        target: Option<&AnyRef>,
    ) -> anyhow::Result<()>;
}

/// 返回后通知 Trait
///
/// 在目标方法成功返回后调用，可以观察但不能替换返回值
pub trait AfterReturningAdvice: Send + Sync {
    /// 获取通知名称
    fn name(&self) -> &str {
        "AfterReturningAdvice"
    }

    /// 执行返回后通知
    fn after_returning(
        &self,
        return_value: &AnyRef,
        method: &MethodDescriptor,
        args: &[AnyRef],
        target: Option<&AnyRef>,
    ) -> anyhow::Result<()>;
}

/// 异常通知 Trait
///
/// 在目标方法（或链上更内层的拦截器）抛出错误时调用。
/// 原错误继续向外传播，通知本身只做观察
pub trait AfterThrowingAdvice: Send + Sync {
    /// 获取通知名称
    fn name(&self) -> &str {
        "AfterThrowingAdvice"
    }

    /// 判断是否处理该错误
    ///
    /// 按声明的错误类型匹配时用 `error.downcast_ref::<E>()` 判定，
    /// 默认处理所有错误
    fn handles(&self, _error: &anyhow::Error) -> bool {
        true
    }

    /// 执行异常通知
    fn after_throwing(
        &self,
        method: &MethodDescriptor,
        args: &[AnyRef],
        target: Option<&AnyRef>,
        error: &anyhow::Error,
    );
}

/// 通知变体
///
/// 环绕通知本身就是规范化形态（拦截器），其余形态在配置期
/// 由适配器包装；`Custom` 只有注册了对应适配器才可被识别
#[derive(Clone)]
pub enum AdviceKind {
    /// 前置通知
    Before(Arc<dyn BeforeAdvice>),
    /// 返回后通知
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    /// 异常通知
    AfterThrowing(Arc<dyn AfterThrowingAdvice>),
    /// 环绕通知（即拦截器本身）
    Around(Arc<dyn MethodInterceptor>),
    /// 扩展通知对象
    Custom(Arc<dyn Any + Send + Sync>),
}

impl AdviceKind {
    /// 获取通知类型
    pub fn advice_type(&self) -> AdviceType {
        match self {
            AdviceKind::Before(_) => AdviceType::Before,
            AdviceKind::AfterReturning(_) => AdviceType::AfterReturning,
            AdviceKind::AfterThrowing(_) => AdviceType::AfterThrowing,
            AdviceKind::Around(_) => AdviceType::Around,
            AdviceKind::Custom(_) => AdviceType::Custom,
        }
    }

    /// 描述通知对象（用于错误与日志）
    pub fn description(&self) -> String {
        match self {
            AdviceKind::Before(advice) => format!("before advice '{}'", advice.name()),
            AdviceKind::AfterReturning(advice) => {
                format!("after-returning advice '{}'", advice.name())
            }
            AdviceKind::AfterThrowing(advice) => {
                format!("after-throwing advice '{}'", advice.name())
            }
            AdviceKind::Around(interceptor) => format!("around advice '{}'", interceptor.name()),
            AdviceKind::Custom(advice) => {
                format!("custom advice object ({:?})", advice.as_ref().type_id())
            }
        }
    }
}

impl fmt::Debug for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
