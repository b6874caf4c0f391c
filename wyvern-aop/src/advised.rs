//! 代理配置（AdvisedSupport）
//!
//! 一次代理构建所需的全部配置：目标来源、契约集、Advisor 列表
//! 与各种开关。配置对象同时拥有按方法键控的拦截器链缓存，
//! "解析一次、复用多次"的性能特性以它为边界

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::adapter::{get_global_adapter_registry, AdviceAdapterRegistry};
use crate::advisor::Advisor;
use crate::chain::{AdvisorChainFactory, ResolvedChain};
use crate::contract::{Contract, MethodDescriptor, TargetClass};
use crate::error::{AopError, AopResult};
use crate::proxy::ProxyStrategy;
use crate::target_source::TargetSource;

/// 每实例策略覆盖回调
///
/// 返回 `Some` 强制指定策略，返回 `None` 交还给默认决策规则
pub type StrategyOverride = Arc<dyn Fn(&TargetClass) -> Option<ProxyStrategy> + Send + Sync>;

/// 代理配置
///
/// 装配完成后调用 [`freeze`](AdvisedSupport::freeze) 声明不可变，
/// 之后链缓存可以无限期保留。冻结前增删 Advisor 会立即清空
/// 缓存，确保任何调用都不会看到陈旧的链
pub struct AdvisedSupport {
    target_source: Arc<dyn TargetSource>,
    contracts: RwLock<Vec<Arc<Contract>>>,
    advisors: RwLock<Vec<Arc<Advisor>>>,
    proxy_target_class: bool,
    strategy_override: Option<StrategyOverride>,
    adapter_registry: Arc<AdviceAdapterRegistry>,
    frozen: RwLock<bool>,
    chain_cache: RwLock<HashMap<MethodDescriptor, Arc<ResolvedChain>>>,
}

impl AdvisedSupport {
    /// 创建新的代理配置
    pub fn new(target_source: Arc<dyn TargetSource>) -> Self {
        Self {
            target_source,
            contracts: RwLock::new(Vec::new()),
            advisors: RwLock::new(Vec::new()),
            proxy_target_class: false,
            strategy_override: None,
            adapter_registry: get_global_adapter_registry().clone(),
            frozen: RwLock::new(false),
            chain_cache: RwLock::new(HashMap::new()),
        }
    }

    /// 添加一个契约
    pub fn with_contract(self, contract: Arc<Contract>) -> Self {
        self.contracts.write().push(contract);
        self
    }

    /// 批量添加契约
    pub fn with_contracts(self, contracts: impl IntoIterator<Item = Arc<Contract>>) -> Self {
        self.contracts.write().extend(contracts);
        self
    }

    /// 要求保留具体类型身份（子类策略）
    pub fn with_proxy_target_class(mut self, proxy_target_class: bool) -> Self {
        self.proxy_target_class = proxy_target_class;
        self
    }

    /// 设置每实例策略覆盖回调
    pub fn with_strategy_override<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TargetClass) -> Option<ProxyStrategy> + Send + Sync + 'static,
    {
        self.strategy_override = Some(Arc::new(callback));
        self
    }

    /// 使用指定的通知适配器注册表
    pub fn with_adapter_registry(mut self, registry: Arc<AdviceAdapterRegistry>) -> Self {
        self.adapter_registry = registry;
        self
    }

    /// 目标来源
    pub fn target_source(&self) -> &Arc<dyn TargetSource> {
        &self.target_source
    }

    /// 目标类型
    ///
    /// 切点适用性永远针对它判定，而不是代理类型
    pub fn target_class(&self) -> TargetClass {
        self.target_source.target_class()
    }

    /// 配置的契约集
    pub fn contracts(&self) -> Vec<Arc<Contract>> {
        self.contracts.read().clone()
    }

    /// 按注册顺序取全部 Advisor
    pub fn advisors(&self) -> Vec<Arc<Advisor>> {
        self.advisors.read().clone()
    }

    /// Advisor 数量
    pub fn advisor_count(&self) -> usize {
        self.advisors.read().len()
    }

    pub fn is_proxy_target_class(&self) -> bool {
        self.proxy_target_class
    }

    pub fn strategy_override(&self) -> Option<&StrategyOverride> {
        self.strategy_override.as_ref()
    }

    pub fn adapter_registry(&self) -> &Arc<AdviceAdapterRegistry> {
        &self.adapter_registry
    }

    /// 添加 Advisor
    ///
    /// 配置冻结后拒绝；成功后立即清空链缓存
    pub fn add_advisor(&self, advisor: Arc<Advisor>) -> AopResult<()> {
        if self.is_frozen() {
            return Err(AopError::ConfigurationFrozen(format!(
                "cannot add advisor '{}'",
                advisor.name()
            )));
        }

        tracing::debug!(
            "Adding advisor '{}' to proxy configuration for '{}'",
            advisor.name(),
            self.target_class().short_name()
        );
        self.advisors.write().push(advisor);
        self.clear_chain_cache();
        Ok(())
    }

    /// 按名称移除 Advisor
    pub fn remove_advisor(&self, name: &str) -> AopResult<()> {
        if self.is_frozen() {
            return Err(AopError::ConfigurationFrozen(format!(
                "cannot remove advisor '{}'",
                name
            )));
        }

        let removed = {
            let mut advisors = self.advisors.write();
            let before = advisors.len();
            advisors.retain(|advisor| advisor.name() != name);
            before != advisors.len()
        };

        if !removed {
            return Err(AopError::AdvisorNotFound(name.to_string()));
        }

        self.clear_chain_cache();
        Ok(())
    }

    /// 冻结配置
    ///
    /// 此后 Advisor 集不再变化，链缓存可以安全地无限期保留
    pub fn freeze(&self) {
        *self.frozen.write() = true;
        tracing::debug!(
            "Proxy configuration frozen for '{}'",
            self.target_class().short_name()
        );
    }

    /// 配置是否已冻结
    pub fn is_frozen(&self) -> bool {
        *self.frozen.read()
    }

    /// 获取方法的拦截器链（带缓存）
    ///
    /// 首次解析的写入采用 insert-if-absent：并发首调用至多重复
    /// 计算，读者决不会看到半成品条目
    pub fn interceptor_chain(&self, method: &MethodDescriptor) -> AopResult<Arc<ResolvedChain>> {
        if let Some(chain) = self.chain_cache.read().get(method) {
            tracing::trace!("Interceptor chain cache hit for {}", method);
            return Ok(chain.clone());
        }

        let chain = AdvisorChainFactory::resolve(self, method)?;

        let mut cache = self.chain_cache.write();
        Ok(cache.entry(*method).or_insert(chain).clone())
    }

    /// 清空链缓存
    fn clear_chain_cache(&self) {
        let mut cache = self.chain_cache.write();
        if !cache.is_empty() {
            tracing::debug!("Clearing interceptor chain cache ({} entries)", cache.len());
            cache.clear();
        }
    }
}

impl std::fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisedSupport")
            .field("target_class", &self.target_class())
            .field("contracts", &self.contracts.read().len())
            .field("advisors", &self.advisors.read().len())
            .field("proxy_target_class", &self.proxy_target_class)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
