//! 代理构建与策略选择
//!
//! 两种策略：契约式代理是一个通用的运行时分发器，只满足声明的
//! 契约面，不能被还原为目标的具体类型；子类式代理保留具体类型
//! 身份，需要编译期生成的增强包装（Rust 没有运行期字节码生成，
//! 等价物按 TypeId 注册）。策略选择对调用方透明，但契约式代理
//! 的运行时类型与目标不同，基于类型身份的比较会观察到差异

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::advised::AdvisedSupport;
use crate::contract::{AnyRef, Contract, DispatchFn, MethodDescriptor};
use crate::error::{AopError, AopResult};
use crate::invocation::{MethodInvocation, ProxyMethodInvocation};

/// 代理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStrategy {
    /// 契约式代理：只实现声明的契约面
    Contract,
    /// 子类式代理：保留目标的具体类型身份
    Subclass,
}

/// 契约式代理
///
/// 持有配置与按方法描述符并联的分发表。每次调用解析（或命中
/// 缓存的）拦截器链；未被通知的方法完全绕过链机制直达目标，
/// 这条路径主导调用量，不分配调用上下文
pub struct ContractProxy {
    advised: Arc<AdvisedSupport>,
    contracts: Vec<Arc<Contract>>,
    dispatch: HashMap<MethodDescriptor, DispatchFn>,
}

impl ContractProxy {
    /// 组装代理
    ///
    /// `rebind_nested` 为 true 时目标本身是代理，所有方法改经
    /// 内层代理转发，保证内层链不被绕过
    fn assemble(
        advised: Arc<AdvisedSupport>,
        contracts: Vec<Arc<Contract>>,
        rebind_nested: bool,
    ) -> Self {
        let mut dispatch = HashMap::new();
        for contract in &contracts {
            for method in contract.methods() {
                let descriptor = *method.descriptor();
                let entry = if rebind_nested {
                    nested_dispatch(descriptor)
                } else {
                    method.dispatch().clone()
                };
                dispatch.entry(descriptor).or_insert(entry);
            }
        }

        Self {
            advised,
            contracts,
            dispatch,
        }
    }

    /// 代理满足的契约集
    pub fn contracts(&self) -> &[Arc<Contract>] {
        &self.contracts
    }

    /// 代理配置
    pub fn advised(&self) -> &Arc<AdvisedSupport> {
        &self.advised
    }

    /// 解包出真实目标（供管理工具使用）
    pub fn target(&self) -> anyhow::Result<AnyRef> {
        self.advised.target_source().get_target()
    }

    /// 通过方法描述符调用
    pub fn invoke(&self, method: &MethodDescriptor, args: &[AnyRef]) -> anyhow::Result<AnyRef> {
        let Some(dispatch) = self.dispatch.get(method) else {
            return Err(AopError::UnknownMethod {
                type_name: self.advised.target_class().short_name().to_string(),
                method: method.signature(),
            }
            .into());
        };

        let chain = self.advised.interceptor_chain(method)?;
        let target = self.advised.target_source().get_target()?;

        if chain.is_empty() {
            // 未被通知的方法：不构建调用上下文，直接分发
            return (dispatch)(&target, args);
        }

        let mut invocation = ProxyMethodInvocation::new(
            Some(target),
            self.advised.target_class(),
            *method,
            args.to_vec(),
            dispatch.clone(),
            chain,
        );
        invocation.proceed()
    }

    /// 按契约名与方法名调用
    pub fn invoke_named(
        &self,
        contract: &str,
        method: &str,
        args: &[AnyRef],
    ) -> anyhow::Result<AnyRef> {
        let descriptor = self
            .dispatch
            .keys()
            .find(|d| d.contract() == contract && d.name() == method)
            .copied();

        match descriptor {
            Some(descriptor) => self.invoke(&descriptor, args),
            None => Err(AopError::UnknownMethod {
                type_name: self.advised.target_class().short_name().to_string(),
                method: format!("{}::{}", contract, method),
            }
            .into()),
        }
    }
}

impl std::fmt::Debug for ContractProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractProxy")
            .field("target_class", &self.advised.target_class())
            .field("methods", &self.dispatch.len())
            .finish()
    }
}

/// 目标是内层代理时的转发分发
fn nested_dispatch(descriptor: MethodDescriptor) -> DispatchFn {
    Arc::new(move |target, args| {
        let proxy = target.downcast_ref::<ContractProxy>().ok_or_else(|| {
            anyhow::anyhow!("nested dispatch target is not a proxy for {}", descriptor)
        })?;
        proxy.invoke(&descriptor, args)
    })
}

/// 子类式代理的增强器
///
/// 接收代理配置，产出保留具体类型身份的包装实例
pub type SubclassFactory = Arc<dyn Fn(Arc<AdvisedSupport>) -> anyhow::Result<AnyRef> + Send + Sync>;

/// 子类式代理工厂注册表
///
/// 增强包装由过程宏（或手写代码）在编译期生成并在此登记；
/// 没有登记的类型无法按子类策略代理，这属于配置错误
pub struct SubclassProxyFactories {
    factories: RwLock<HashMap<TypeId, SubclassFactory>>,
}

impl SubclassProxyFactories {
    /// 创建新的注册表
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// 为具体类型登记增强器
    pub fn register<T, F>(&self, factory: F)
    where
        T: Any,
        F: Fn(Arc<AdvisedSupport>) -> anyhow::Result<AnyRef> + Send + Sync + 'static,
    {
        tracing::debug!(
            "Registering subclass proxy factory for '{}'",
            std::any::type_name::<T>()
        );
        self.factories
            .write()
            .insert(TypeId::of::<T>(), Arc::new(factory));
    }

    /// 是否已为该类型登记增强器
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.factories.read().contains_key(&type_id)
    }

    /// 构建子类式代理
    pub fn create(&self, advised: Arc<AdvisedSupport>) -> AopResult<AnyRef> {
        let target_class = advised.target_class();
        let factory = self
            .factories
            .read()
            .get(&target_class.type_id())
            .cloned()
            .ok_or_else(|| AopError::ProxyCreation {
                type_name: target_class.short_name().to_string(),
                reason: "no subclass enhancer registered; the type is not extensible this way"
                    .to_string(),
            })?;

        factory(advised).map_err(|error| AopError::ProxyCreation {
            type_name: target_class.short_name().to_string(),
            reason: error.to_string(),
        })
    }
}

impl Default for SubclassProxyFactories {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局子类式代理工厂注册表
static GLOBAL_SUBCLASS_FACTORIES: Lazy<Arc<SubclassProxyFactories>> =
    Lazy::new(|| Arc::new(SubclassProxyFactories::new()));

/// 获取全局子类式代理工厂注册表
pub fn get_global_subclass_factories() -> &'static Arc<SubclassProxyFactories> {
    &GLOBAL_SUBCLASS_FACTORIES
}

/// 代理工厂
///
/// 按既定规则为配置选择策略并构建代理。构建失败立即报错，
/// 已判定需要通知的实例决不会以未代理形态悄悄返回
pub struct ProxyFactory {
    subclass_factories: Arc<SubclassProxyFactories>,
}

impl ProxyFactory {
    /// 创建使用全局增强器注册表的代理工厂
    pub fn new() -> Self {
        Self {
            subclass_factories: get_global_subclass_factories().clone(),
        }
    }

    /// 使用指定的增强器注册表
    pub fn with_subclass_factories(subclass_factories: Arc<SubclassProxyFactories>) -> Self {
        Self { subclass_factories }
    }

    /// 选择代理策略
    ///
    /// 规则依序：
    /// 1. 显式要求保留具体类型 → 子类策略
    /// 2. 目标本身是运行期生成的代理类型 → 契约策略，
    ///    沿用其原始契约面
    /// 3. 每实例覆盖回调有判定 → 按回调
    /// 4. 至少暴露一个契约 → 契约策略
    /// 5. 兜底 → 子类策略
    pub fn select_strategy(&self, advised: &AdvisedSupport) -> ProxyStrategy {
        let target_class = advised.target_class();

        if advised.is_proxy_target_class() {
            return ProxyStrategy::Subclass;
        }

        if target_class.type_id() == TypeId::of::<ContractProxy>() {
            return ProxyStrategy::Contract;
        }

        if let Some(callback) = advised.strategy_override() {
            if let Some(strategy) = callback(&target_class) {
                return strategy;
            }
        }

        if !advised.contracts().is_empty() {
            return ProxyStrategy::Contract;
        }

        ProxyStrategy::Subclass
    }

    /// 构建代理
    pub fn create_proxy(&self, advised: Arc<AdvisedSupport>) -> AopResult<AnyRef> {
        let strategy = self.select_strategy(&advised);
        let target_class = advised.target_class();
        tracing::debug!(
            "Creating {:?} proxy for '{}' with {} advisor(s)",
            strategy,
            target_class.short_name(),
            advised.advisor_count()
        );

        match strategy {
            ProxyStrategy::Contract => {
                let nested = target_class.type_id() == TypeId::of::<ContractProxy>();
                let mut contracts = advised.contracts();

                if contracts.is_empty() && nested {
                    // 生成类型自身的契约面不可靠，前传内层代理声明的契约
                    let target = advised.target_source().get_target().map_err(|error| {
                        AopError::ProxyCreation {
                            type_name: target_class.short_name().to_string(),
                            reason: error.to_string(),
                        }
                    })?;
                    if let Some(inner) = target.downcast_ref::<ContractProxy>() {
                        contracts = inner.contracts().to_vec();
                    }
                }

                if contracts.is_empty() {
                    return Err(AopError::ProxyCreation {
                        type_name: target_class.short_name().to_string(),
                        reason: "no contracts available for a contract-based proxy".to_string(),
                    });
                }

                Ok(Arc::new(ContractProxy::assemble(advised, contracts, nested)) as AnyRef)
            }
            ProxyStrategy::Subclass => self.subclass_factories.create(advised),
        }
    }
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::new()
    }
}
