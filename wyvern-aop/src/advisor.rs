//! Advisor 定义与注册表
//!
//! Advisor 是一份完整的横切声明：通知 + 切点 + 排序值。
//! 配置期创建一次，之后不可变、可共享

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::advice::AdviceKind;
use crate::contract::{Contract, TargetClass};
use crate::pointcut::{Pointcut, TruePointcut};

/// Advisor 的默认排序值
///
/// 数字越小优先级越高，在链上越靠外执行
pub const DEFAULT_ADVISOR_ORDER: i32 = 1000;

/// Advisor：通知 + 切点 + 排序值
pub struct Advisor {
    name: String,
    advice: AdviceKind,
    pointcut: Arc<dyn Pointcut>,
    order: i32,
}

impl Advisor {
    /// 创建新的 Advisor（默认排序值）
    pub fn new(name: impl Into<String>, advice: AdviceKind, pointcut: Arc<dyn Pointcut>) -> Self {
        Self {
            name: name.into(),
            advice,
            pointcut,
            order: DEFAULT_ADVISOR_ORDER,
        }
    }

    /// 创建无条件适用的 Advisor
    pub fn unconditional(name: impl Into<String>, advice: AdviceKind) -> Self {
        Self::new(name, advice, Arc::new(TruePointcut))
    }

    /// 设置排序值
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Advisor 名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 通知
    pub fn advice(&self) -> &AdviceKind {
        &self.advice
    }

    /// 切点
    pub fn pointcut(&self) -> &Arc<dyn Pointcut> {
        &self.pointcut
    }

    /// 排序值
    pub fn order(&self) -> i32 {
        self.order
    }

    /// 静态预检：该 Advisor 是否可能适用于目标类型
    ///
    /// 类过滤器必须命中；在契约信息可用时进一步要求至少有一个
    /// 方法通过静态方法匹配。没有契约信息时只能依据类过滤器判定
    pub fn can_apply(&self, target_class: &TargetClass, contracts: &[Arc<Contract>]) -> bool {
        if !self.pointcut.class_filter().matches(target_class) {
            return false;
        }

        if contracts.is_empty() {
            return true;
        }

        let matcher = self.pointcut.method_matcher();
        contracts
            .iter()
            .flat_map(|contract| contract.methods())
            .any(|method| matcher.matches(method.descriptor(), target_class))
    }
}

impl std::fmt::Debug for Advisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Advisor")
            .field("name", &self.name)
            .field("advice", &self.advice)
            .field("order", &self.order)
            .finish()
    }
}

/// 候选 Advisor 来源
///
/// 由生命周期容器（或本模块的注册表）实现，自动代理决策门
/// 通过它查询全量候选集
pub trait CandidateAdvisorSource: Send + Sync {
    /// 按注册顺序返回全部候选 Advisor
    fn candidate_advisors(&self) -> Vec<Arc<Advisor>>;
}

/// Advisor 注册表
///
/// 装配阶段的共享候选集。注册顺序被保留，同序 Advisor 的
/// 先后关系以它为准
pub struct AdvisorRegistry {
    advisors: RwLock<Vec<Arc<Advisor>>>,
}

impl AdvisorRegistry {
    /// 创建新的 Advisor 注册表
    pub fn new() -> Self {
        Self {
            advisors: RwLock::new(Vec::new()),
        }
    }

    /// 注册 Advisor
    pub fn register(&self, advisor: Arc<Advisor>) {
        tracing::debug!("Registering advisor: {}", advisor.name());
        self.advisors.write().push(advisor);
    }

    /// 批量注册 Advisor
    pub fn register_all(&self, advisors: impl IntoIterator<Item = Arc<Advisor>>) {
        for advisor in advisors {
            self.register(advisor);
        }
    }

    /// 按注册顺序取全部 Advisor
    pub fn advisors(&self) -> Vec<Arc<Advisor>> {
        self.advisors.read().clone()
    }

    /// 获取注册的 Advisor 数量
    pub fn len(&self) -> usize {
        self.advisors.read().len()
    }

    /// 检查是否没有注册任何 Advisor
    pub fn is_empty(&self) -> bool {
        self.advisors.read().is_empty()
    }

    /// 清除所有 Advisor
    pub fn clear(&self) {
        self.advisors.write().clear();
    }

    /// 从 inventory 自动加载所有注册的 Advisor
    ///
    /// 扫描所有通过 `AdvisorRegistration` 提交的声明并装入注册表
    pub fn auto_load_advisors(&self) {
        let registrations: Vec<_> = get_all_advisor_registrations().collect();
        tracing::info!("Auto-loading {} advisor(s) from registry", registrations.len());

        for registration in registrations {
            tracing::debug!("  ├─ Loading advisor: {}", registration.name);
            self.register(registration.create_instance());
        }

        tracing::info!("Auto-loaded {} advisor(s)", self.len());
    }
}

impl Default for AdvisorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateAdvisorSource for AdvisorRegistry {
    fn candidate_advisors(&self) -> Vec<Arc<Advisor>> {
        self.advisors()
    }
}

/// Advisor 注册器
///
/// 用于 inventory 自动收集和注册 Advisor
pub struct AdvisorRegistration {
    /// Advisor 名称
    pub name: &'static str,

    /// 创建 Advisor 实例的函数
    pub creator: fn() -> Arc<Advisor>,
}

impl AdvisorRegistration {
    /// 创建新的 Advisor 注册器
    pub const fn new(name: &'static str, creator: fn() -> Arc<Advisor>) -> Self {
        Self { name, creator }
    }

    /// 创建 Advisor 实例
    pub fn create_instance(&self) -> Arc<Advisor> {
        (self.creator)()
    }
}

inventory::collect!(AdvisorRegistration);

/// 获取所有注册的 Advisor 注册器
pub fn get_all_advisor_registrations() -> impl Iterator<Item = &'static AdvisorRegistration> {
    inventory::iter::<AdvisorRegistration>()
}

/// 全局 Advisor 注册表
///
/// 首次访问时自动加载所有通过 inventory 注册的 Advisor
static GLOBAL_ADVISOR_REGISTRY: Lazy<Arc<AdvisorRegistry>> = Lazy::new(|| {
    let registry = AdvisorRegistry::new();
    registry.auto_load_advisors();
    Arc::new(registry)
});

/// 获取全局 Advisor 注册表
pub fn get_global_registry() -> &'static Arc<AdvisorRegistry> {
    &GLOBAL_ADVISOR_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::BeforeAdvice;
    use crate::contract::{AnyRef, MethodDescriptor};
    use crate::pointcut::ExpressionPointcut;

    struct UserService;
    struct AuditLog;

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

    fn advisor_for(expression: &str) -> Advisor {
        Advisor::new(
            "test",
            AdviceKind::Before(Arc::new(NoopBefore)),
            Arc::new(ExpressionPointcut::execution(expression)),
        )
    }

    fn user_service_contract() -> Arc<Contract> {
        Contract::builder::<UserService>("UserService")
            .method("get_user", |_, _| Ok(Arc::new(()) as AnyRef))
            .method("delete_user", |_, _| Ok(Arc::new(()) as AnyRef))
            .build()
    }

    #[test]
    fn test_can_apply_by_class_filter() {
        let advisor = advisor_for("* UserService.*(..)");
        let contracts = vec![user_service_contract()];

        assert!(advisor.can_apply(&TargetClass::of::<UserService>(), &contracts));
        assert!(!advisor.can_apply(&TargetClass::of::<AuditLog>(), &[]));
    }

    #[test]
    fn test_can_apply_requires_matching_method() {
        // 类过滤器命中，但契约里没有任何方法能通过方法匹配
        let advisor = advisor_for("* UserService.reset_password(..)");
        let contracts = vec![user_service_contract()];

        assert!(!advisor.can_apply(&TargetClass::of::<UserService>(), &contracts));
    }

    #[test]
    fn test_registry_preserves_registration_order() {
        let registry = AdvisorRegistry::new();
        registry.register(Arc::new(advisor_for("* A.*(..)").with_order(5)));
        registry.register(Arc::new(advisor_for("* B.*(..)").with_order(1)));

        // 注册表不排序，只保序；排序由链解析负责
        let advisors = registry.advisors();
        assert_eq!(advisors.len(), 2);
        assert_eq!(advisors[0].order(), 5);
        assert_eq!(advisors[1].order(), 1);
    }

    #[test]
    fn test_registry_clear() {
        let registry = AdvisorRegistry::new();
        registry.register(Arc::new(advisor_for("* A.*(..)")));
        assert!(!registry.is_empty());

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }
}
