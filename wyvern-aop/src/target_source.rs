//! TargetSource - 真实目标的间接层
//!
//! 代理不直接持有目标实例，而是通过 TargetSource 取得它，
//! 以支持固定单例之外的策略（懒初始化、每调用新建等）

use std::any::Any;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::contract::{AnyRef, TargetClass};

/// 目标来源
pub trait TargetSource: Send + Sync {
    /// 目标的具体类型
    fn target_class(&self) -> TargetClass;

    /// 目标是否恒定
    ///
    /// 恒定目标允许做与参数无关的跨调用优化；返回 false 时
    /// 每次调用都必须重新获取目标
    fn is_static(&self) -> bool;

    /// 获取要调用的真实目标
    fn get_target(&self) -> anyhow::Result<AnyRef>;
}

/// 固定单例目标（最常见的策略）
pub struct SingletonTargetSource {
    target: AnyRef,
    target_class: TargetClass,
}

impl SingletonTargetSource {
    /// 从具体类型的实例创建
    pub fn new<T: Any + Send + Sync>(target: Arc<T>) -> Self {
        Self {
            target_class: TargetClass::of::<T>(),
            target,
        }
    }

    /// 从已类型擦除的实例创建（容器递交的形态）
    pub fn from_parts(target: AnyRef, target_class: TargetClass) -> Self {
        Self {
            target,
            target_class,
        }
    }
}

impl TargetSource for SingletonTargetSource {
    fn target_class(&self) -> TargetClass {
        self.target_class
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> anyhow::Result<AnyRef> {
        Ok(self.target.clone())
    }
}

/// 懒初始化目标
///
/// 第一次调用时才创建目标，之后恒定复用
pub struct LazyInitTargetSource {
    cell: OnceCell<AnyRef>,
    factory: Box<dyn Fn() -> anyhow::Result<AnyRef> + Send + Sync>,
    target_class: TargetClass,
}

impl LazyInitTargetSource {
    /// 创建新的懒初始化目标来源
    pub fn new<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Box::new(move || factory().map(|target| target as AnyRef)),
            target_class: TargetClass::of::<T>(),
        }
    }
}

impl TargetSource for LazyInitTargetSource {
    fn target_class(&self) -> TargetClass {
        self.target_class
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> anyhow::Result<AnyRef> {
        self.cell
            .get_or_try_init(|| {
                tracing::debug!(
                    "Lazily initializing target '{}'",
                    self.target_class.short_name()
                );
                (self.factory)()
            })
            .map(Arc::clone)
    }
}

/// 每调用新建目标
///
/// 目标在调用间会变化，代理不得缓存任何依赖目标身份的结论
pub struct PrototypeTargetSource {
    factory: Box<dyn Fn() -> anyhow::Result<AnyRef> + Send + Sync>,
    target_class: TargetClass,
}

impl PrototypeTargetSource {
    /// 创建新的原型目标来源
    pub fn new<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(move || factory().map(|target| target as AnyRef)),
            target_class: TargetClass::of::<T>(),
        }
    }
}

impl TargetSource for PrototypeTargetSource {
    fn target_class(&self) -> TargetClass {
        self.target_class
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<AnyRef> {
        tracing::trace!(
            "Creating new prototype target '{}'",
            self.target_class.short_name()
        );
        (self.factory)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Repo {
        id: usize,
    }

    #[test]
    fn test_singleton_is_static_and_shared() {
        let source = SingletonTargetSource::new(Arc::new(Repo { id: 1 }));
        assert!(source.is_static());
        assert_eq!(source.target_class().short_name(), "Repo");

        let first = source.get_target().unwrap();
        let second = source.get_target().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_lazy_initializes_exactly_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let source = LazyInitTargetSource::new(move || {
            let id = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Repo { id }))
        });

        assert!(source.is_static());
        assert_eq!(created.load(Ordering::SeqCst), 0);

        let first = source.get_target().unwrap();
        let second = source.get_target().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(first.downcast_ref::<Repo>().unwrap().id, 0);
    }

    #[test]
    fn test_prototype_creates_per_call() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let source = PrototypeTargetSource::new(move || {
            let id = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Repo { id }))
        });

        assert!(!source.is_static());

        let first = source.get_target().unwrap();
        let second = source.get_target().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }
}
