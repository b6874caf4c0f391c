//! 契约（Contract）与方法标识
//!
//! Rust 没有运行时反射，代理的"接口"以显式的契约描述表达：
//! 一组方法描述符，各自绑定一个类型擦除的分发闭包。契约通常由
//! 过程宏在编译时生成，也可以通过 [`ContractBuilder`] 手工构建

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// 类型擦除的共享值（目标实例、参数、返回值统一使用）
pub type AnyRef = Arc<dyn Any + Send + Sync>;

/// 分发函数：把类型擦除的 (目标, 参数) 还原为真实方法调用
pub type DispatchFn = Arc<dyn Fn(&AnyRef, &[AnyRef]) -> anyhow::Result<AnyRef> + Send + Sync>;

/// 目标类型标识
///
/// 以 `TypeId` 为同一性依据，类型名仅用于日志与切点名称匹配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetClass {
    type_id: TypeId,
    type_name: &'static str,
}

impl TargetClass {
    /// 取具体类型的标识
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 未在契约注册表中登记过的类型
    ///
    /// 容器递来的实例只剩运行时 `TypeId`，类型名无从恢复
    pub fn unregistered(type_id: TypeId) -> Self {
        Self {
            type_id,
            type_name: "<unregistered>",
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 该标识是否来自未登记的类型（类型名不可用）
    pub fn is_unregistered(&self) -> bool {
        self.type_name == "<unregistered>"
    }

    /// 完整类型名（含模块路径）
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 短类型名（去掉模块路径，切点表达式按它匹配）
    pub fn short_name(&self) -> &'static str {
        self.type_name
            .rsplit("::")
            .next()
            .unwrap_or(self.type_name)
    }
}

impl fmt::Display for TargetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// 方法描述符
///
/// 连接点的静态标识：声明契约 + 方法名，可哈希、可比较，
/// 同时充当链缓存的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    contract: &'static str,
    name: &'static str,
}

impl MethodDescriptor {
    /// 创建新的方法描述符
    pub const fn new(contract: &'static str, name: &'static str) -> Self {
        Self { contract, name }
    }

    /// 声明该方法的契约名
    pub fn contract(&self) -> &'static str {
        self.contract
    }

    /// 方法名称
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 获取完整的方法签名
    pub fn signature(&self) -> String {
        format!("{}::{}", self.contract, self.name)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.contract, self.name)
    }
}

/// 契约中的一个方法：描述符 + 分发闭包
#[derive(Clone)]
pub struct ContractMethod {
    descriptor: MethodDescriptor,
    dispatch: DispatchFn,
}

impl ContractMethod {
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    pub fn dispatch(&self) -> &DispatchFn {
        &self.dispatch
    }
}

impl fmt::Debug for ContractMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractMethod")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// 契约：某个具体类型对外暴露的一组方法
///
/// 等价于其他语言里"目标实现的接口"，是契约式代理的构建材料
pub struct Contract {
    name: &'static str,
    target: TargetClass,
    methods: Vec<ContractMethod>,
}

impl Contract {
    /// 为具体类型 `T` 开始构建契约
    pub fn builder<T: Any + Send + Sync>(name: &'static str) -> ContractBuilder {
        ContractBuilder {
            name,
            target: TargetClass::of::<T>(),
            methods: Vec::new(),
        }
    }

    /// 契约名称
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 契约绑定的目标类型
    pub fn target(&self) -> &TargetClass {
        &self.target
    }

    /// 契约内的全部方法
    pub fn methods(&self) -> &[ContractMethod] {
        &self.methods
    }

    /// 按方法名查找描述符
    pub fn method(&self, name: &str) -> Option<&ContractMethod> {
        self.methods.iter().find(|m| m.descriptor.name() == name)
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// 契约构建器
pub struct ContractBuilder {
    name: &'static str,
    target: TargetClass,
    methods: Vec<ContractMethod>,
}

impl ContractBuilder {
    /// 注册一个方法及其分发闭包
    pub fn method<F>(mut self, method_name: &'static str, dispatch: F) -> Self
    where
        F: Fn(&AnyRef, &[AnyRef]) -> anyhow::Result<AnyRef> + Send + Sync + 'static,
    {
        self.methods.push(ContractMethod {
            descriptor: MethodDescriptor::new(self.name, method_name),
            dispatch: Arc::new(dispatch),
        });
        self
    }

    pub fn build(self) -> Arc<Contract> {
        Arc::new(Contract {
            name: self.name,
            target: self.target,
            methods: self.methods,
        })
    }
}

/// 分发闭包里还原目标实例的辅助函数
pub fn downcast_target<T: Any>(target: &AnyRef) -> anyhow::Result<&T> {
    target.downcast_ref::<T>().ok_or_else(|| {
        anyhow::anyhow!(
            "target type mismatch: expected '{}'",
            std::any::type_name::<T>()
        )
    })
}

/// 分发闭包里还原第 `index` 个参数的辅助函数
pub fn downcast_arg<T: Any>(args: &[AnyRef], index: usize) -> anyhow::Result<&T> {
    let arg = args
        .get(index)
        .ok_or_else(|| anyhow::anyhow!("missing argument at index {}", index))?;
    arg.downcast_ref::<T>().ok_or_else(|| {
        anyhow::anyhow!(
            "argument {} type mismatch: expected '{}'",
            index,
            std::any::type_name::<T>()
        )
    })
}

/// 契约注册表
///
/// 记录每个具体类型暴露的契约集，供代理策略选择与 Advisor
/// 适用性预检查询。装配阶段填充，运行期只读
pub struct ContractRegistry {
    classes: RwLock<HashMap<TypeId, TargetClass>>,
    contracts: RwLock<HashMap<TypeId, Vec<Arc<Contract>>>>,
}

impl ContractRegistry {
    /// 创建新的契约注册表
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
            contracts: RwLock::new(HashMap::new()),
        }
    }

    /// 注册契约
    pub fn register(&self, contract: Arc<Contract>) {
        let target = *contract.target();
        tracing::debug!(
            "Registering contract '{}' for type '{}'",
            contract.name(),
            target.short_name()
        );
        self.classes.write().insert(target.type_id(), target);
        self.contracts
            .write()
            .entry(target.type_id())
            .or_default()
            .push(contract);
    }

    /// 批量注册契约
    pub fn register_all(&self, contracts: impl IntoIterator<Item = Arc<Contract>>) {
        for contract in contracts {
            self.register(contract);
        }
    }

    /// 查询类型暴露的契约集
    pub fn contracts_for(&self, type_id: TypeId) -> Vec<Arc<Contract>> {
        self.contracts
            .read()
            .get(&type_id)
            .cloned()
            .unwrap_or_default()
    }

    /// 由运行时 `TypeId` 恢复类型标识
    pub fn class_of(&self, type_id: TypeId) -> Option<TargetClass> {
        self.classes.read().get(&type_id).copied()
    }

    /// 已登记的类型数量
    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    /// 检查是否没有登记任何契约
    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }

    /// 从 inventory 自动加载所有注册的契约
    pub fn auto_load_contracts(&self) {
        let registrations: Vec<_> = get_all_contract_registrations().collect();
        tracing::info!("Auto-loading {} contract(s) from registry", registrations.len());

        for registration in registrations {
            tracing::debug!("  ├─ Loading contract for type: {}", registration.type_name);
            self.register(registration.create_instance());
        }
    }
}

impl Default for ContractRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 契约注册器
///
/// 用于 inventory 自动收集和注册契约
pub struct ContractRegistration {
    /// 目标类型名（仅用于日志）
    pub type_name: &'static str,

    /// 创建契约实例的函数
    pub creator: fn() -> Arc<Contract>,
}

impl ContractRegistration {
    /// 创建新的契约注册器
    pub const fn new(type_name: &'static str, creator: fn() -> Arc<Contract>) -> Self {
        Self { type_name, creator }
    }

    /// 创建契约实例
    pub fn create_instance(&self) -> Arc<Contract> {
        (self.creator)()
    }
}

inventory::collect!(ContractRegistration);

/// 获取所有注册的契约注册器
pub fn get_all_contract_registrations() -> impl Iterator<Item = &'static ContractRegistration> {
    inventory::iter::<ContractRegistration>()
}

/// 全局契约注册表
///
/// 首次访问时自动加载所有通过 inventory 注册的契约
static GLOBAL_CONTRACT_REGISTRY: Lazy<Arc<ContractRegistry>> = Lazy::new(|| {
    let registry = ContractRegistry::new();
    registry.auto_load_contracts();
    Arc::new(registry)
});

/// 获取全局契约注册表
pub fn get_global_contract_registry() -> &'static Arc<ContractRegistry> {
    &GLOBAL_CONTRACT_REGISTRY
}
