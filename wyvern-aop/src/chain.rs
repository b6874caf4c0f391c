//! 拦截器链解析
//!
//! 针对一个 (目标类型, 方法) 连接点，从 Advisor 集合算出有序的
//! 拦截器链。解析结果由 [`AdvisedSupport`] 按方法键缓存，
//! 参数相关的匹配器以动态条目保留，逐调用只复查残余谓词，
//! 决不重复整个解析过程

use std::sync::Arc;

use crate::advised::AdvisedSupport;
use crate::contract::MethodDescriptor;
use crate::error::AopResult;
use crate::invocation::MethodInterceptor;
use crate::pointcut::Pointcut;

/// 已解析链上的一段
#[derive(Clone)]
pub enum ChainEntry {
    /// 静态匹配即成立的拦截器
    Static(Arc<dyn MethodInterceptor>),

    /// 参数相关的拦截器，每次调用前复查切点的运行时谓词
    Dynamic {
        interceptor: Arc<dyn MethodInterceptor>,
        pointcut: Arc<dyn Pointcut>,
    },
}

/// 一个连接点的已解析拦截器链
///
/// 构建完成后只读，可被并发调用安全共享
pub struct ResolvedChain {
    entries: Vec<ChainEntry>,
    dynamic: bool,
}

impl ResolvedChain {
    /// 由已排序的条目构建链
    pub fn new(entries: Vec<ChainEntry>, dynamic: bool) -> Self {
        Self { entries, dynamic }
    }

    /// 链上的条目
    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    /// 链是否为空
    ///
    /// 空链的方法调用必须完全绕过链机制直达目标
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 是否含有参数相关的条目
    pub fn has_dynamic(&self) -> bool {
        self.dynamic
    }
}

/// Advisor 链工厂
///
/// 解析算法：类过滤 → 方法静态匹配 → 规范化为拦截器。
/// 排序按 (order, 注册顺序) 稳定进行，同序 Advisor 保持
/// 注册时的先后关系
pub struct AdvisorChainFactory;

impl AdvisorChainFactory {
    /// 解析适用于指定方法的拦截器链
    pub fn resolve(
        config: &AdvisedSupport,
        method: &MethodDescriptor,
    ) -> AopResult<Arc<ResolvedChain>> {
        let target_class = config.target_class();
        let adapter_registry = config.adapter_registry();

        // Vec 的 sort_by_key 是稳定排序，注册顺序天然成为并列时的次序
        let mut advisors = config.advisors();
        advisors.sort_by_key(|advisor| advisor.order());

        let mut entries = Vec::new();
        let mut dynamic = false;

        for advisor in &advisors {
            let pointcut = advisor.pointcut();

            if !pointcut.class_filter().matches(&target_class) {
                continue;
            }

            let matcher = pointcut.method_matcher();
            if !matcher.matches_with_introductions(method, &target_class, false) {
                continue;
            }

            let interceptors = adapter_registry.interceptors(advisor)?;
            if matcher.is_runtime() {
                // 静态匹配成立但还依赖运行时参数：保留为动态条目
                dynamic = true;
                for interceptor in interceptors {
                    entries.push(ChainEntry::Dynamic {
                        interceptor,
                        pointcut: pointcut.clone(),
                    });
                }
            } else {
                for interceptor in interceptors {
                    entries.push(ChainEntry::Static(interceptor));
                }
            }
        }

        tracing::debug!(
            "Resolved {} interceptor(s) for {} on '{}'{}",
            entries.len(),
            method,
            target_class.short_name(),
            if dynamic { " (has dynamic matchers)" } else { "" }
        );

        Ok(Arc::new(ResolvedChain::new(entries, dynamic)))
    }
}
