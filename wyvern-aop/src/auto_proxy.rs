//! 自动代理决策门
//!
//! 生命周期容器在每个受管实例"构造完成、交付之前"调用一次的
//! 钩子：判定实例是否需要代理，取得适用的 Advisor，仅在确有
//! 通知（或自定义 TargetSource 要求包装）时请求构建代理。
//! 否定判定按实例键缓存，重复查询是 O(1) 快路径

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::adapter::{get_global_adapter_registry, AdviceAdapterRegistry};
use crate::advised::AdvisedSupport;
use crate::advisor::{Advisor, AdvisorRegistry, CandidateAdvisorSource};
use crate::contract::{get_global_contract_registry, AnyRef, ContractRegistry, TargetClass};
use crate::error::AopResult;
use crate::proxy::{ContractProxy, ProxyFactory, SubclassProxyFactories};
use crate::target_source::{SingletonTargetSource, TargetSource};

/// 容器提示
///
/// 生命周期容器对特定类型/实例的元数据查询与否决
pub trait ProxyingHints: Send + Sync {
    /// 该类型是否属于框架基础设施
    fn is_infrastructure(&self, _target_class: &TargetClass) -> bool {
        false
    }

    /// 容器对特定实例的否决（例如显式标记为"保持原始对象"的实例）
    fn should_skip(&self, _target_class: &TargetClass, _key: &str) -> bool {
        false
    }
}

/// 默认提示：不做任何额外否决
pub struct DefaultProxyingHints;

impl ProxyingHints for DefaultProxyingHints {}

/// 自定义 TargetSource 创建钩子
///
/// 命中的实例即使没有任何 Advisor 也会被包装
pub trait TargetSourceCreator: Send + Sync {
    /// 为实例给出定制的目标来源，`None` 表示不接管
    fn target_source(
        &self,
        instance: &AnyRef,
        target_class: &TargetClass,
        key: &str,
    ) -> Option<Arc<dyn TargetSource>>;
}

/// 自动代理配置
#[derive(Debug, Clone, Deserialize)]
pub struct AutoProxySettings {
    /// 是否启用自动代理
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// 是否一律采用子类策略（保留具体类型身份）
    #[serde(default)]
    pub proxy_target_class: bool,

    /// 决策门在容器钩子序列里的优先级（数字越小越先执行）
    #[serde(default = "default_order")]
    pub order: i32,
}

fn default_enabled() -> bool {
    true
}

fn default_order() -> i32 {
    2000
}

impl Default for AutoProxySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            proxy_target_class: false,
            // 决策门应该在其他钩子之后执行，确保实例已完全初始化
            order: 2000,
        }
    }
}

/// 实例就绪钩子
///
/// 容器与本子系统之间的交换契约：实例构造完成后交给钩子，
/// 钩子返回（可能被替换的）实例
pub trait InstanceProcessor: Send + Sync {
    /// 钩子名称（用于日志和调试）
    fn name(&self) -> &str {
        "InstanceProcessor"
    }

    /// 钩子优先级（数字越小优先级越高）
    fn order(&self) -> i32 {
        1000
    }

    /// 实例就绪：返回原实例或其替代品
    fn on_instance_ready(&self, instance: AnyRef, key: &str) -> AopResult<AnyRef>;

    /// 实例参与依赖环时的提前引用
    fn on_early_reference(&self, instance: AnyRef, _key: &str) -> AopResult<AnyRef> {
        Ok(instance)
    }
}

/// 自动代理创建器
///
/// 决策流程：资格缓存快路径 → 基础设施与容器否决 → 查询适用
/// Advisor → 构建代理并记录判定。同一实例键的 Advisor 查询
/// 至多发生一次
pub struct AutoProxyCreator {
    settings: AutoProxySettings,
    advisor_source: Arc<dyn CandidateAdvisorSource>,
    contract_registry: Arc<ContractRegistry>,
    adapter_registry: Arc<AdviceAdapterRegistry>,
    proxy_factory: ProxyFactory,
    hints: Arc<dyn ProxyingHints>,
    target_source_creators: Vec<Arc<dyn TargetSourceCreator>>,

    /// 实例键 → 是否需要代理（false 即永久的否定快路径）
    eligibility: RwLock<HashMap<String, bool>>,

    /// 实例键 → 代理的具体类型（供后续类型查询）
    proxy_types: RwLock<HashMap<String, TypeId>>,

    /// 提前引用路径产出的代理，正常路径必须复用同一实例
    early_proxies: RwLock<HashMap<String, AnyRef>>,
}

impl AutoProxyCreator {
    /// 创建新的自动代理创建器
    pub fn new(advisor_source: Arc<dyn CandidateAdvisorSource>) -> Self {
        Self {
            settings: AutoProxySettings::default(),
            advisor_source,
            contract_registry: get_global_contract_registry().clone(),
            adapter_registry: get_global_adapter_registry().clone(),
            proxy_factory: ProxyFactory::new(),
            hints: Arc::new(DefaultProxyingHints),
            target_source_creators: Vec::new(),
            eligibility: RwLock::new(HashMap::new()),
            proxy_types: RwLock::new(HashMap::new()),
            early_proxies: RwLock::new(HashMap::new()),
        }
    }

    /// 使用指定配置
    pub fn with_settings(mut self, settings: AutoProxySettings) -> Self {
        self.settings = settings;
        self
    }

    /// 使用指定容器提示
    pub fn with_hints(mut self, hints: Arc<dyn ProxyingHints>) -> Self {
        self.hints = hints;
        self
    }

    /// 使用指定契约注册表
    pub fn with_contract_registry(mut self, registry: Arc<ContractRegistry>) -> Self {
        self.contract_registry = registry;
        self
    }

    /// 使用指定通知适配器注册表
    pub fn with_adapter_registry(mut self, registry: Arc<AdviceAdapterRegistry>) -> Self {
        self.adapter_registry = registry;
        self
    }

    /// 使用指定代理工厂
    pub fn with_proxy_factory(mut self, factory: ProxyFactory) -> Self {
        self.proxy_factory = factory;
        self
    }

    /// 追加自定义 TargetSource 创建钩子
    pub fn with_target_source_creator(mut self, creator: Arc<dyn TargetSourceCreator>) -> Self {
        self.target_source_creators.push(creator);
        self
    }

    /// 当前配置
    pub fn settings(&self) -> &AutoProxySettings {
        &self.settings
    }

    /// 实例就绪钩子主体
    pub fn process_instance(&self, instance: AnyRef, key: &str) -> AopResult<AnyRef> {
        if !self.settings.enabled {
            return Ok(instance);
        }

        let target_class = self.lookup_class(&instance);
        let cache_key = self.cache_key(&target_class, key);

        // 提前引用路径已经产出过代理：交回同一个实例，
        // 依赖环必须收敛到一张对象图
        if let Some(existing) = self.early_proxies.read().get(&cache_key) {
            tracing::debug!("Reusing early proxy reference for '{}'", cache_key);
            return Ok(existing.clone());
        }

        self.wrap_if_necessary(instance, target_class, cache_key)
    }

    /// 提前引用钩子主体
    ///
    /// 实例参与依赖环时，其他协作者在正常代理点之前索要引用。
    /// 此处产出并记住代理，正常路径稍后返回同一个实例
    pub fn get_early_reference(&self, instance: AnyRef, key: &str) -> AopResult<AnyRef> {
        let target_class = self.lookup_class(&instance);
        let cache_key = self.cache_key(&target_class, key);

        if let Some(existing) = self.early_proxies.read().get(&cache_key) {
            return Ok(existing.clone());
        }

        let wrapped = self.wrap_if_necessary(instance, target_class, cache_key.clone())?;

        let mut early = self.early_proxies.write();
        Ok(early.entry(cache_key).or_insert(wrapped).clone())
    }

    /// 查询实例键对应的代理类型（O(1)）
    pub fn proxy_type_of(&self, key: &str) -> Option<TypeId> {
        self.proxy_types.read().get(key).copied()
    }

    /// 实例键：命名实例用名称，未命名实例退化为类型标识
    fn cache_key(&self, target_class: &TargetClass, key: &str) -> String {
        if !key.is_empty() {
            return key.to_string();
        }
        // 未登记的类型没有可用的类型名，用 TypeId 保证键不冲突
        if target_class.is_unregistered() {
            format!("{:?}", target_class.type_id())
        } else {
            target_class.type_name().to_string()
        }
    }

    /// 由运行时 TypeId 恢复类型标识
    fn lookup_class(&self, instance: &AnyRef) -> TargetClass {
        let type_id = instance.as_ref().type_id();
        self.contract_registry
            .class_of(type_id)
            .unwrap_or_else(|| TargetClass::unregistered(type_id))
    }

    fn wrap_if_necessary(
        &self,
        instance: AnyRef,
        target_class: TargetClass,
        cache_key: String,
    ) -> AopResult<AnyRef> {
        // 否定快路径：先前已判定不需要代理
        if let Some(false) = self.eligibility.read().get(&cache_key).copied() {
            return Ok(instance);
        }

        // 基础设施类型决不代理，防止代理机器自我代理的无限回归
        if self.is_infrastructure(&target_class) || self.hints.should_skip(&target_class, &cache_key)
        {
            tracing::trace!("Instance '{}' is exempt from proxying", cache_key);
            self.eligibility.write().insert(cache_key, false);
            return Ok(instance);
        }

        // 自定义 TargetSource：命中的实例即使没有 Advisor 也要包装
        let custom_target_source = self.find_custom_target_source(&instance, &target_class, &cache_key);

        let contracts = self.contract_registry.contracts_for(target_class.type_id());
        let advisors: Vec<Arc<Advisor>> = self
            .advisor_source
            .candidate_advisors()
            .into_iter()
            .filter(|advisor| advisor.can_apply(&target_class, &contracts))
            .collect();

        if advisors.is_empty() && custom_target_source.is_none() {
            tracing::trace!("Instance '{}' matches no advisor, skipping proxying", cache_key);
            self.eligibility.write().insert(cache_key, false);
            return Ok(instance);
        }

        let target_source: Arc<dyn TargetSource> = custom_target_source.unwrap_or_else(|| {
            Arc::new(SingletonTargetSource::from_parts(
                instance.clone(),
                target_class,
            ))
        });

        let advised = Arc::new(
            AdvisedSupport::new(target_source)
                .with_contracts(contracts)
                .with_proxy_target_class(self.settings.proxy_target_class)
                .with_adapter_registry(self.adapter_registry.clone()),
        );
        let advisor_count = advisors.len();
        for advisor in advisors {
            advised.add_advisor(advisor)?;
        }
        // 自动装配的配置是完整的，冻结后链缓存可以无限期保留
        advised.freeze();

        let proxy = self.proxy_factory.create_proxy(advised)?;

        tracing::info!(
            "Created AOP proxy for '{}' with {} advisor(s)",
            cache_key,
            advisor_count
        );
        self.eligibility.write().insert(cache_key.clone(), true);
        self.proxy_types
            .write()
            .insert(cache_key, proxy.as_ref().type_id());

        Ok(proxy)
    }

    /// 本引擎自身的类型集合
    fn is_infrastructure(&self, target_class: &TargetClass) -> bool {
        let type_id = target_class.type_id();
        type_id == TypeId::of::<Advisor>()
            || type_id == TypeId::of::<AdvisorRegistry>()
            || type_id == TypeId::of::<AdviceAdapterRegistry>()
            || type_id == TypeId::of::<ContractRegistry>()
            || type_id == TypeId::of::<SubclassProxyFactories>()
            || type_id == TypeId::of::<AdvisedSupport>()
            || type_id == TypeId::of::<ContractProxy>()
            || type_id == TypeId::of::<AutoProxyCreator>()
            || self.hints.is_infrastructure(target_class)
    }

    fn find_custom_target_source(
        &self,
        instance: &AnyRef,
        target_class: &TargetClass,
        key: &str,
    ) -> Option<Arc<dyn TargetSource>> {
        self.target_source_creators
            .iter()
            .find_map(|creator| creator.target_source(instance, target_class, key))
    }
}

impl InstanceProcessor for AutoProxyCreator {
    fn name(&self) -> &str {
        "AutoProxyCreator"
    }

    fn order(&self) -> i32 {
        self.settings.order
    }

    fn on_instance_ready(&self, instance: AnyRef, key: &str) -> AopResult<AnyRef> {
        self.process_instance(instance, key)
    }

    fn on_early_reference(&self, instance: AnyRef, key: &str) -> AopResult<AnyRef> {
        self.get_early_reference(instance, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{AdviceKind, BeforeAdvice};
    use crate::contract::{downcast_target, Contract, MethodDescriptor};
    use crate::pointcut::ExpressionPointcut;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct BillingService {
        invoices: usize,
    }

    impl BillingService {
        fn invoice_count(&self) -> usize {
            self.invoices
        }
    }

    struct NoopBefore;

    impl BeforeAdvice for NoopBefore {
        fn before(
            &self,
            _method: &MethodDescriptor,
            _args: &[AnyRef],
            _target: Option<&AnyRef>,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// 统计查询次数的 Advisor 来源
    struct CountingSource {
        lookups: Arc<AtomicUsize>,
        advisors: Vec<Arc<Advisor>>,
    }

    impl CandidateAdvisorSource for CountingSource {
        fn candidate_advisors(&self) -> Vec<Arc<Advisor>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.advisors.clone()
        }
    }

    fn billing_contract() -> Arc<Contract> {
        Contract::builder::<BillingService>("BillingService")
            .method("invoice_count", |target, _args| {
                let service = downcast_target::<BillingService>(target)?;
                Ok(Arc::new(service.invoice_count()) as AnyRef)
            })
            .build()
    }

    fn billing_advisor() -> Arc<Advisor> {
        Arc::new(Advisor::new(
            "billing-before",
            AdviceKind::Before(Arc::new(NoopBefore)),
            Arc::new(ExpressionPointcut::execution("* BillingService.*(..)")),
        ))
    }

    fn registry_with_contract() -> Arc<ContractRegistry> {
        let registry = Arc::new(ContractRegistry::new());
        registry.register(billing_contract());
        registry
    }

    fn creator(
        advisors: Vec<Arc<Advisor>>,
        lookups: &Arc<AtomicUsize>,
    ) -> AutoProxyCreator {
        AutoProxyCreator::new(Arc::new(CountingSource {
            lookups: lookups.clone(),
            advisors,
        }))
        .with_contract_registry(registry_with_contract())
    }

    #[test]
    fn test_no_advisors_never_proxied_and_lookup_cached() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let gate = creator(Vec::new(), &lookups);

        let instance: AnyRef = Arc::new(BillingService { invoices: 3 });

        let first = gate.process_instance(instance.clone(), "billingService").unwrap();
        assert!(Arc::ptr_eq(&first, &instance));
        assert_eq!(lookups.load(Ordering::SeqCst), 1);

        // 再次询问同一实例键：否定判定命中缓存，查询不再发生
        let second = gate.process_instance(instance.clone(), "billingService").unwrap();
        assert!(Arc::ptr_eq(&second, &instance));
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_matching_advisor_produces_proxy() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let gate = creator(vec![billing_advisor()], &lookups);

        let instance: AnyRef = Arc::new(BillingService { invoices: 7 });
        let wrapped = gate.process_instance(instance, "billingService").unwrap();

        let proxy = wrapped.downcast_ref::<ContractProxy>().unwrap();
        let result = proxy.invoke_named("BillingService", "invoice_count", &[]).unwrap();
        assert_eq!(*result.downcast_ref::<usize>().unwrap(), 7);

        // 代理类型被记录，供后续类型查询
        assert_eq!(
            gate.proxy_type_of("billingService"),
            Some(TypeId::of::<ContractProxy>())
        );
    }

    #[test]
    fn test_infrastructure_is_never_proxied() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let gate = creator(vec![billing_advisor()], &lookups);

        let advisor_instance: AnyRef = billing_advisor();
        let result = gate.process_instance(advisor_instance.clone(), "").unwrap();
        assert!(Arc::ptr_eq(&result, &advisor_instance));
        // 基础设施在 Advisor 查询之前就被拦下
        assert_eq!(lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_container_veto_via_hints() {
        struct SkipBilling;

        impl ProxyingHints for SkipBilling {
            fn should_skip(&self, _target_class: &TargetClass, key: &str) -> bool {
                key == "billingService"
            }
        }

        let lookups = Arc::new(AtomicUsize::new(0));
        let gate = creator(vec![billing_advisor()], &lookups).with_hints(Arc::new(SkipBilling));

        let instance: AnyRef = Arc::new(BillingService { invoices: 1 });
        let result = gate.process_instance(instance.clone(), "billingService").unwrap();
        assert!(Arc::ptr_eq(&result, &instance));
        assert_eq!(lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_early_reference_resolves_to_single_proxy() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let gate = creator(vec![billing_advisor()], &lookups);

        let instance: AnyRef = Arc::new(BillingService { invoices: 2 });

        // 依赖环中的协作者先拿到提前引用
        let early = gate
            .get_early_reference(instance.clone(), "billingService")
            .unwrap();
        assert!(early.downcast_ref::<ContractProxy>().is_some());

        // 正常代理点必须交回同一个代理实例
        let normal = gate.process_instance(instance, "billingService").unwrap();
        assert!(Arc::ptr_eq(&early, &normal));
    }

    #[test]
    fn test_custom_target_source_forces_wrapping() {
        struct AlwaysCustom;

        impl TargetSourceCreator for AlwaysCustom {
            fn target_source(
                &self,
                instance: &AnyRef,
                target_class: &TargetClass,
                _key: &str,
            ) -> Option<Arc<dyn TargetSource>> {
                Some(Arc::new(SingletonTargetSource::from_parts(
                    instance.clone(),
                    *target_class,
                )))
            }
        }

        let lookups = Arc::new(AtomicUsize::new(0));
        // 没有任何 Advisor，但自定义 TargetSource 仍要求包装
        let gate = creator(Vec::new(), &lookups).with_target_source_creator(Arc::new(AlwaysCustom));

        let instance: AnyRef = Arc::new(BillingService { invoices: 5 });
        let wrapped = gate.process_instance(instance, "billingService").unwrap();
        let proxy = wrapped.downcast_ref::<ContractProxy>().unwrap();

        let result = proxy.invoke_named("BillingService", "invoice_count", &[]).unwrap();
        assert_eq!(*result.downcast_ref::<usize>().unwrap(), 5);
    }

    #[test]
    fn test_disabled_gate_is_inert() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let settings = AutoProxySettings {
            enabled: false,
            ..AutoProxySettings::default()
        };
        let gate = creator(vec![billing_advisor()], &lookups).with_settings(settings);

        let instance: AnyRef = Arc::new(BillingService { invoices: 9 });
        let result = gate.process_instance(instance.clone(), "billingService").unwrap();
        assert!(Arc::ptr_eq(&result, &instance));
        assert_eq!(lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unnamed_instance_keyed_by_type() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let gate = creator(Vec::new(), &lookups);

        let instance: AnyRef = Arc::new(BillingService { invoices: 0 });
        gate.process_instance(instance.clone(), "").unwrap();
        gate.process_instance(instance, "").unwrap();

        // 未命名实例按类型键缓存，查询同样只发生一次
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }
}
