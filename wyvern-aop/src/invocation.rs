//! 调用运行时
//!
//! 每次外部调用创建一个一次性的链游标，按洋葱模型推进：
//! 每个拦截器通过 `proceed()` 决定是否、何时、几次进入链的剩余部分，
//! 游标走到链尾时经由 TargetSource 调用真实目标

use std::fmt;
use std::sync::Arc;

use crate::chain::{ChainEntry, ResolvedChain};
use crate::contract::{AnyRef, DispatchFn, MethodDescriptor, TargetClass};

/// 方法调用上下文
///
/// 一次调用的只读视图加上链游标。除游标外全部字段在整条链
/// 遍历期间保持不变，嵌套通知与诊断工具可以放心内省
pub trait MethodInvocation: Send {
    /// 静态部分：被调用的方法
    ///
    /// 整条链操作同一个连接点，拦截器不能把调用改投到别的方法
    fn method(&self) -> &MethodDescriptor;

    /// 目标实例（未绑定实例的调用返回 None）
    fn this_target(&self) -> Option<&AnyRef>;

    /// 目标类型
    fn target_class(&self) -> &TargetClass;

    /// 调用参数
    fn args(&self) -> &[AnyRef];

    /// 推进到链上的下一段
    ///
    /// 拦截器可以不调用（短路，自身成为调用结果的唯一来源）、
    /// 调用一次（典型场景）或调用多次（重试语义，每次都从当前
    /// 游标位置重新执行链的剩余部分）。错误原样向外传播，
    /// 运行时不做任何隐式处理
    fn proceed(&mut self) -> anyhow::Result<AnyRef>;
}

/// 拦截器
///
/// 所有通知形态规范化后的统一形态，可直接参与链式组合
pub trait MethodInterceptor: Send + Sync {
    /// 拦截器名称（用于日志和诊断）
    fn name(&self) -> &str {
        "MethodInterceptor"
    }

    /// 环绕调用：观察、替换或跳过 `invocation.proceed()`
    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<AnyRef>;
}

/// 代理方法调用
///
/// 单次调用的链游标实现，调用结束后即丢弃，不得跨调用保留
pub struct ProxyMethodInvocation {
    target: Option<AnyRef>,
    target_class: TargetClass,
    method: MethodDescriptor,
    args: Vec<AnyRef>,
    dispatch: DispatchFn,
    chain: Arc<ResolvedChain>,
    cursor: usize,
}

impl ProxyMethodInvocation {
    /// 创建新的调用上下文
    pub fn new(
        target: Option<AnyRef>,
        target_class: TargetClass,
        method: MethodDescriptor,
        args: Vec<AnyRef>,
        dispatch: DispatchFn,
        chain: Arc<ResolvedChain>,
    ) -> Self {
        Self {
            target,
            target_class,
            method,
            args,
            dispatch,
            chain,
            cursor: 0,
        }
    }

    /// 链尾：调用真实目标
    fn invoke_target(&self) -> anyhow::Result<AnyRef> {
        let target = self.target.as_ref().ok_or_else(|| {
            anyhow::anyhow!("no target bound for invocation of {}", self.method)
        })?;
        (self.dispatch)(target, &self.args)
    }
}

impl MethodInvocation for ProxyMethodInvocation {
    fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    fn this_target(&self) -> Option<&AnyRef> {
        self.target.as_ref()
    }

    fn target_class(&self) -> &TargetClass {
        &self.target_class
    }

    fn args(&self) -> &[AnyRef] {
        &self.args
    }

    fn proceed(&mut self) -> anyhow::Result<AnyRef> {
        if self.cursor >= self.chain.entries().len() {
            return self.invoke_target();
        }

        let index = self.cursor;
        self.cursor = index + 1;

        let entry = self.chain.entries()[index].clone();
        let result = match entry {
            ChainEntry::Static(interceptor) => interceptor.invoke(self),
            ChainEntry::Dynamic {
                interceptor,
                pointcut,
            } => {
                let matched = pointcut.method_matcher().matches_args(
                    &self.method,
                    &self.target_class,
                    &self.args,
                );
                if matched {
                    interceptor.invoke(self)
                } else {
                    // 动态匹配未命中：跳过该拦截器，继续链的剩余部分
                    self.proceed()
                }
            }
        };

        // 返回前回退游标，让当前拦截器可以再次 proceed（重试语义）
        self.cursor = index;
        result
    }
}

impl fmt::Debug for ProxyMethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyMethodInvocation")
            .field("method", &self.method)
            .field("target_class", &self.target_class)
            .field("args", &self.args.len())
            .field("chain_len", &self.chain.entries().len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ResolvedChain;
    use crate::contract::TargetClass;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Greeter;

    fn greeter_dispatch(calls: Arc<AtomicUsize>) -> DispatchFn {
        Arc::new(move |_target, _args| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new("hello".to_string()) as AnyRef)
        })
    }

    fn invocation_with(
        chain: Arc<ResolvedChain>,
        target_calls: Arc<AtomicUsize>,
    ) -> ProxyMethodInvocation {
        ProxyMethodInvocation::new(
            Some(Arc::new(Greeter) as AnyRef),
            TargetClass::of::<Greeter>(),
            MethodDescriptor::new("Greeter", "greet"),
            Vec::new(),
            greeter_dispatch(target_calls),
            chain,
        )
    }

    /// 记录自己被调用的拦截器
    struct Recording {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        short_circuit: bool,
    }

    impl MethodInterceptor for Recording {
        fn name(&self) -> &str {
            self.label
        }

        fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<AnyRef> {
            self.log.lock().unwrap().push(self.label);
            if self.short_circuit {
                return Ok(Arc::new("short-circuited".to_string()) as AnyRef);
            }
            invocation.proceed()
        }
    }

    fn recording_chain(
        log: &Arc<Mutex<Vec<&'static str>>>,
        short_circuit_middle: bool,
    ) -> Arc<ResolvedChain> {
        let entries = vec![
            ChainEntry::Static(Arc::new(Recording {
                label: "first",
                log: log.clone(),
                short_circuit: false,
            })),
            ChainEntry::Static(Arc::new(Recording {
                label: "second",
                log: log.clone(),
                short_circuit: short_circuit_middle,
            })),
            ChainEntry::Static(Arc::new(Recording {
                label: "third",
                log: log.clone(),
                short_circuit: false,
            })),
        ];
        Arc::new(ResolvedChain::new(entries, false))
    }

    #[test]
    fn test_full_chain_traversal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let target_calls = Arc::new(AtomicUsize::new(0));
        let mut invocation = invocation_with(recording_chain(&log, false), target_calls.clone());

        let result = invocation.proceed().unwrap();
        assert_eq!(result.downcast_ref::<String>().unwrap(), "hello");
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(target_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_short_circuit_stops_chain_and_target() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let target_calls = Arc::new(AtomicUsize::new(0));
        let mut invocation = invocation_with(recording_chain(&log, true), target_calls.clone());

        let result = invocation.proceed().unwrap();
        assert_eq!(result.downcast_ref::<String>().unwrap(), "short-circuited");
        // 第三个拦截器与目标都不能被执行
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(target_calls.load(Ordering::SeqCst), 0);
    }

    /// 把链的剩余部分执行两遍的重试拦截器
    struct Retry;

    impl MethodInterceptor for Retry {
        fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<AnyRef> {
            match invocation.proceed() {
                Ok(value) => Ok(value),
                Err(_) => invocation.proceed(),
            }
        }
    }

    /// 第一次调用失败、之后成功的拦截器
    struct FlakyOnce {
        attempts: Arc<AtomicUsize>,
    }

    impl MethodInterceptor for FlakyOnce {
        fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<AnyRef> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                anyhow::bail!("transient failure");
            }
            invocation.proceed()
        }
    }

    #[test]
    fn test_reentrant_proceed_retries_remainder() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let target_calls = Arc::new(AtomicUsize::new(0));
        let entries = vec![
            ChainEntry::Static(Arc::new(Retry) as Arc<dyn MethodInterceptor>),
            ChainEntry::Static(Arc::new(FlakyOnce {
                attempts: attempts.clone(),
            })),
        ];
        let chain = Arc::new(ResolvedChain::new(entries, false));
        let mut invocation = invocation_with(chain, target_calls.clone());

        // 第一次剩余链失败，重试后独立地再执行一遍并成功
        let result = invocation.proceed().unwrap();
        assert_eq!(result.downcast_ref::<String>().unwrap(), "hello");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(target_calls.load(Ordering::SeqCst), 1);
    }

    /// 断言连接点静态部分在整条链上保持不变的拦截器
    struct AssertsJoinPoint {
        expected: MethodDescriptor,
    }

    impl MethodInterceptor for AssertsJoinPoint {
        fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<AnyRef> {
            assert_eq!(*invocation.method(), self.expected);
            assert!(invocation.this_target().is_some());
            let result = invocation.proceed();
            // proceed 之后静态部分依旧不变
            assert_eq!(*invocation.method(), self.expected);
            result
        }
    }

    #[test]
    fn test_static_part_constant_across_traversal() {
        let expected = MethodDescriptor::new("Greeter", "greet");
        let target_calls = Arc::new(AtomicUsize::new(0));
        let entries = vec![
            ChainEntry::Static(Arc::new(AssertsJoinPoint { expected }) as Arc<dyn MethodInterceptor>),
            ChainEntry::Static(Arc::new(AssertsJoinPoint { expected })),
        ];
        let chain = Arc::new(ResolvedChain::new(entries, false));
        let mut invocation = invocation_with(chain, target_calls);

        invocation.proceed().unwrap();
    }

    #[test]
    fn test_error_propagates_unchanged() {
        struct AlwaysFails;

        impl MethodInterceptor for AlwaysFails {
            fn invoke(&self, _invocation: &mut dyn MethodInvocation) -> anyhow::Result<AnyRef> {
                anyhow::bail!("deliberate failure")
            }
        }

        let target_calls = Arc::new(AtomicUsize::new(0));
        let entries = vec![ChainEntry::Static(
            Arc::new(AlwaysFails) as Arc<dyn MethodInterceptor>
        )];
        let chain = Arc::new(ResolvedChain::new(entries, false));
        let mut invocation = invocation_with(chain, target_calls.clone());

        let error = invocation.proceed().unwrap_err();
        assert_eq!(error.to_string(), "deliberate failure");
        assert_eq!(target_calls.load(Ordering::SeqCst), 0);
    }
}
