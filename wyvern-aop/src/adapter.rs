//! 通知适配器注册表
//!
//! 把异构的通知形态统一规范化为拦截器。默认支持前置、返回后、
//! 异常三种形态；环绕通知本身就是拦截器，零成本直通。
//! 新的通知形态通过注册适配器扩展

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::advice::{AdviceKind, AfterReturningAdvice, AfterThrowingAdvice, BeforeAdvice};
use crate::advisor::Advisor;
use crate::error::{AopError, AopResult, ErrorInfo};
use crate::invocation::{MethodInterceptor, MethodInvocation};
use crate::contract::AnyRef;

/// Advisor 适配器
///
/// 声明 (a) 自己支持哪些通知形态，(b) 如何把它包装为拦截器
pub trait AdvisorAdapter: Send + Sync {
    /// 适配器名称
    fn name(&self) -> &str;

    /// 是否支持该通知
    fn supports(&self, advice: &AdviceKind) -> bool;

    /// 把 Advisor 的通知包装为拦截器
    ///
    /// 只会在 `supports` 判定通过后调用；形态不符返回配置错误
    fn to_interceptor(&self, advisor: &Advisor) -> AopResult<Arc<dyn MethodInterceptor>>;
}

/// 前置通知拦截器
pub struct BeforeAdviceInterceptor {
    advice: Arc<dyn BeforeAdvice>,
}

impl BeforeAdviceInterceptor {
    pub fn new(advice: Arc<dyn BeforeAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for BeforeAdviceInterceptor {
    fn name(&self) -> &str {
        self.advice.name()
    }

    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<AnyRef> {
        self.advice
            .before(invocation.method(), invocation.args(), invocation.this_target())?;
        invocation.proceed()
    }
}

/// 返回后通知拦截器
pub struct AfterReturningInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl AfterReturningInterceptor {
    pub fn new(advice: Arc<dyn AfterReturningAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterReturningInterceptor {
    fn name(&self) -> &str {
        self.advice.name()
    }

    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<AnyRef> {
        let return_value = invocation.proceed()?;
        self.advice.after_returning(
            &return_value,
            invocation.method(),
            invocation.args(),
            invocation.this_target(),
        )?;
        Ok(return_value)
    }
}

/// 异常通知拦截器
pub struct ThrowsAdviceInterceptor {
    advice: Arc<dyn AfterThrowingAdvice>,
}

impl ThrowsAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterThrowingAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for ThrowsAdviceInterceptor {
    fn name(&self) -> &str {
        self.advice.name()
    }

    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<AnyRef> {
        match invocation.proceed() {
            Ok(value) => Ok(value),
            Err(error) => {
                // 只观察声明要处理的错误类型，原错误照样向外传播
                if self.advice.handles(&error) {
                    tracing::trace!(
                        "Advice '{}' observing failure of {}: {}",
                        self.advice.name(),
                        invocation.method(),
                        ErrorInfo::from_error(&error).full_description()
                    );
                    self.advice.after_throwing(
                        invocation.method(),
                        invocation.args(),
                        invocation.this_target(),
                        &error,
                    );
                }
                Err(error)
            }
        }
    }
}

/// 前置通知适配器
struct BeforeAdviceAdapter;

impl AdvisorAdapter for BeforeAdviceAdapter {
    fn name(&self) -> &str {
        "BeforeAdviceAdapter"
    }

    fn supports(&self, advice: &AdviceKind) -> bool {
        matches!(advice, AdviceKind::Before(_))
    }

    fn to_interceptor(&self, advisor: &Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            AdviceKind::Before(advice) => {
                Ok(Arc::new(BeforeAdviceInterceptor::new(advice.clone())))
            }
            other => Err(AopError::UnknownAdviceType(other.description())),
        }
    }
}

/// 返回后通知适配器
struct AfterReturningAdviceAdapter;

impl AdvisorAdapter for AfterReturningAdviceAdapter {
    fn name(&self) -> &str {
        "AfterReturningAdviceAdapter"
    }

    fn supports(&self, advice: &AdviceKind) -> bool {
        matches!(advice, AdviceKind::AfterReturning(_))
    }

    fn to_interceptor(&self, advisor: &Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            AdviceKind::AfterReturning(advice) => {
                Ok(Arc::new(AfterReturningInterceptor::new(advice.clone())))
            }
            other => Err(AopError::UnknownAdviceType(other.description())),
        }
    }
}

/// 异常通知适配器
struct ThrowsAdviceAdapter;

impl AdvisorAdapter for ThrowsAdviceAdapter {
    fn name(&self) -> &str {
        "ThrowsAdviceAdapter"
    }

    fn supports(&self, advice: &AdviceKind) -> bool {
        matches!(advice, AdviceKind::AfterThrowing(_))
    }

    fn to_interceptor(&self, advisor: &Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            AdviceKind::AfterThrowing(advice) => {
                Ok(Arc::new(ThrowsAdviceInterceptor::new(advice.clone())))
            }
            other => Err(AopError::UnknownAdviceType(other.description())),
        }
    }
}

/// 通知适配器注册表
///
/// 适配器集合小且固定，线性扫描即可，无需索引结构
pub struct AdviceAdapterRegistry {
    adapters: RwLock<Vec<Arc<dyn AdvisorAdapter>>>,
}

impl AdviceAdapterRegistry {
    /// 创建带默认适配器的注册表
    pub fn new() -> Self {
        let registry = Self {
            adapters: RwLock::new(Vec::new()),
        };
        registry.register_adapter(Arc::new(BeforeAdviceAdapter));
        registry.register_adapter(Arc::new(AfterReturningAdviceAdapter));
        registry.register_adapter(Arc::new(ThrowsAdviceAdapter));
        registry
    }

    /// 注册适配器
    pub fn register_adapter(&self, adapter: Arc<dyn AdvisorAdapter>) {
        tracing::debug!("Registering advice adapter: {}", adapter.name());
        self.adapters.write().push(adapter);
    }

    /// 该通知形态是否可被规范化
    pub fn supports(&self, advice: &AdviceKind) -> bool {
        matches!(advice, AdviceKind::Around(_))
            || self.adapters.read().iter().any(|a| a.supports(advice))
    }

    /// 规范化：把任意通知形态包装为无条件适用的 Advisor
    pub fn wrap(&self, name: impl Into<String>, advice: AdviceKind) -> AopResult<Advisor> {
        if !self.supports(&advice) {
            return Err(AopError::UnknownAdviceType(advice.description()));
        }
        Ok(Advisor::unconditional(name, advice))
    }

    /// 把 Advisor 的通知转为拦截器序列
    ///
    /// 环绕通知直接返回（避免二次包装）；其余按注册顺序扫描
    /// 适配器，应用第一个支持的。没有任何适配器支持时报
    /// 配置错误并指明问题对象
    pub fn interceptors(&self, advisor: &Advisor) -> AopResult<Vec<Arc<dyn MethodInterceptor>>> {
        if let AdviceKind::Around(interceptor) = advisor.advice() {
            return Ok(vec![interceptor.clone()]);
        }

        let adapters = self.adapters.read();
        for adapter in adapters.iter() {
            if adapter.supports(advisor.advice()) {
                return Ok(vec![adapter.to_interceptor(advisor)?]);
            }
        }

        Err(AopError::UnknownAdviceType(advisor.advice().description()))
    }
}

impl Default for AdviceAdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局通知适配器注册表
static GLOBAL_ADAPTER_REGISTRY: Lazy<Arc<AdviceAdapterRegistry>> =
    Lazy::new(|| Arc::new(AdviceAdapterRegistry::new()));

/// 获取全局通知适配器注册表
pub fn get_global_adapter_registry() -> &'static Arc<AdviceAdapterRegistry> {
    &GLOBAL_ADAPTER_REGISTRY
}
