//! Wyvern AOP - 面向切面的代理拦截引擎
//!
//! 为受管实例自动套上代理，把方法调用先引过一条按序组装、
//! 按方法缓存的横切拦截器链，再（视情况）到达真实实现。支持：
//! - 多种通知类型（Before、AfterReturning、AfterThrowing、Around）
//! - 切点表达式与参数相关的动态匹配
//! - 契约式 / 子类式两种代理策略，按既定规则自动选择
//! - 容器钩子驱动的自动代理决策，带 O(1) 资格缓存
//! - 编译时注册（inventory），运行时高性能（链解析一次、复用多次）

pub mod adapter;
pub mod advice;
pub mod advised;
pub mod advisor;
pub mod auto_proxy;
pub mod chain;
pub mod contract;
pub mod error;
pub mod invocation;
pub mod pointcut;
pub mod proxy;
pub mod target_source;

// 重新导出核心类型
pub use adapter::{
    get_global_adapter_registry, AdviceAdapterRegistry, AdvisorAdapter, AfterReturningInterceptor,
    BeforeAdviceInterceptor, ThrowsAdviceInterceptor,
};
pub use advice::{
    AdviceKind, AdviceType, AfterReturningAdvice, AfterThrowingAdvice, BeforeAdvice,
};
pub use advised::{AdvisedSupport, StrategyOverride};
pub use advisor::{
    get_all_advisor_registrations, get_global_registry, Advisor, AdvisorRegistration,
    AdvisorRegistry, CandidateAdvisorSource, DEFAULT_ADVISOR_ORDER,
};
pub use auto_proxy::{
    AutoProxyCreator, AutoProxySettings, DefaultProxyingHints, InstanceProcessor, ProxyingHints,
    TargetSourceCreator,
};
pub use chain::{AdvisorChainFactory, ChainEntry, ResolvedChain};
pub use contract::{
    downcast_arg, downcast_target, get_all_contract_registrations, get_global_contract_registry,
    AnyRef, Contract, ContractBuilder, ContractMethod, ContractRegistration, ContractRegistry,
    DispatchFn, MethodDescriptor, TargetClass,
};
pub use error::{AopError, AopResult, ErrorInfo};
pub use invocation::{MethodInterceptor, MethodInvocation, ProxyMethodInvocation};
pub use pointcut::{
    ClassFilter, DynamicPointcut, ExpressionPointcut, MethodMatcher, NamePattern, NoneClassFilter,
    NoneMethodMatcher, NonePointcut, Pointcut, TrueClassFilter, TrueMethodMatcher, TruePointcut,
};
pub use proxy::{
    get_global_subclass_factories, ContractProxy, ProxyFactory, ProxyStrategy, SubclassFactory,
    SubclassProxyFactories,
};
pub use target_source::{
    LazyInitTargetSource, PrototypeTargetSource, SingletonTargetSource, TargetSource,
};

// 导出 inventory 供注册声明使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::adapter::{AdviceAdapterRegistry, AdvisorAdapter};
    pub use crate::advice::{
        AdviceKind, AdviceType, AfterReturningAdvice, AfterThrowingAdvice, BeforeAdvice,
    };
    pub use crate::advised::AdvisedSupport;
    pub use crate::advisor::{
        get_global_registry, Advisor, AdvisorRegistration, AdvisorRegistry,
        CandidateAdvisorSource,
    };
    pub use crate::auto_proxy::{
        AutoProxyCreator, AutoProxySettings, InstanceProcessor, ProxyingHints,
    };
    pub use crate::contract::{
        downcast_arg, downcast_target, get_global_contract_registry, AnyRef, Contract,
        ContractRegistration, ContractRegistry, MethodDescriptor, TargetClass,
    };
    pub use crate::error::{AopError, AopResult, ErrorInfo};
    pub use crate::invocation::{MethodInterceptor, MethodInvocation};
    pub use crate::pointcut::{
        DynamicPointcut, ExpressionPointcut, NamePattern, Pointcut, TruePointcut,
    };
    pub use crate::proxy::{ContractProxy, ProxyFactory, ProxyStrategy};
    pub use crate::target_source::{SingletonTargetSource, TargetSource};
}
