//! 切点（Pointcut）匹配系统
//!
//! 切点是一对谓词：类过滤器决定 Advisor 是否适用于某个目标类型，
//! 方法匹配器决定是否适用于该类型上的某个方法。
//! 所有实现必须是纯函数且幂等，链解析期间会被反复调用

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::contract::{AnyRef, MethodDescriptor, TargetClass};

/// 类过滤器
///
/// 判定依据永远是目标类型本身，而不是代理类型
pub trait ClassFilter: Send + Sync {
    /// 检查目标类型是否匹配
    fn matches(&self, target_class: &TargetClass) -> bool;
}

/// 方法匹配器
pub trait MethodMatcher: Send + Sync {
    /// 检查方法是否匹配
    fn matches(&self, method: &MethodDescriptor, target_class: &TargetClass) -> bool;

    /// 引入感知的重载
    ///
    /// 当目标被附加了额外契约时，匹配器可以据此给出不同判定，
    /// 默认退化为两参形式
    fn matches_with_introductions(
        &self,
        method: &MethodDescriptor,
        target_class: &TargetClass,
        _has_introductions: bool,
    ) -> bool {
        self.matches(method, target_class)
    }

    /// 静态匹配是否不充分，需要逐调用检查运行时参数
    fn is_runtime(&self) -> bool {
        false
    }

    /// 运行时参数匹配
    ///
    /// 仅在 `is_runtime()` 为 true 时于每次调用前评估
    fn matches_args(
        &self,
        method: &MethodDescriptor,
        target_class: &TargetClass,
        _args: &[AnyRef],
    ) -> bool {
        self.matches(method, target_class)
    }
}

/// 切点 Trait
pub trait Pointcut: Send + Sync {
    /// 类级谓词
    fn class_filter(&self) -> &dyn ClassFilter;

    /// 方法级谓词
    fn method_matcher(&self) -> &dyn MethodMatcher;
}

/// 恒真类过滤器
pub struct TrueClassFilter;

impl ClassFilter for TrueClassFilter {
    fn matches(&self, _target_class: &TargetClass) -> bool {
        true
    }
}

/// 恒真方法匹配器
pub struct TrueMethodMatcher;

impl MethodMatcher for TrueMethodMatcher {
    fn matches(&self, _method: &MethodDescriptor, _target_class: &TargetClass) -> bool {
        true
    }
}

static TRUE_CLASS_FILTER: TrueClassFilter = TrueClassFilter;
static TRUE_METHOD_MATCHER: TrueMethodMatcher = TrueMethodMatcher;

/// 匹配一切的切点
///
/// 无条件适用的 Advisor（如静态注册的拦截器）的组合原语
pub struct TruePointcut;

impl Pointcut for TruePointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        &TRUE_CLASS_FILTER
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        &TRUE_METHOD_MATCHER
    }
}

/// 恒假类过滤器
pub struct NoneClassFilter;

impl ClassFilter for NoneClassFilter {
    fn matches(&self, _target_class: &TargetClass) -> bool {
        false
    }
}

/// 恒假方法匹配器
pub struct NoneMethodMatcher;

impl MethodMatcher for NoneMethodMatcher {
    fn matches(&self, _method: &MethodDescriptor, _target_class: &TargetClass) -> bool {
        false
    }
}

static NONE_CLASS_FILTER: NoneClassFilter = NoneClassFilter;
static NONE_METHOD_MATCHER: NoneMethodMatcher = NoneMethodMatcher;

/// 什么都不匹配的切点
pub struct NonePointcut;

impl Pointcut for NonePointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        &NONE_CLASS_FILTER
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        &NONE_METHOD_MATCHER
    }
}

/// 名称模式
///
/// 切点表达式的基本构件，对类型名或方法名做匹配
#[derive(Clone)]
pub enum NamePattern {
    /// 匹配任意名称
    All,

    /// 精确匹配
    Exact(String),

    /// 通配符匹配（支持 `*`）
    /// 例如：`User*`、`*Service`、`*Service*`
    Wildcard(String),

    /// 正则表达式匹配
    Pattern(Regex),

    /// 自定义匹配函数
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),

    /// 与运算（AND）
    And(Box<NamePattern>, Box<NamePattern>),

    /// 或运算（OR）
    Or(Box<NamePattern>, Box<NamePattern>),

    /// 非运算（NOT）
    Not(Box<NamePattern>),
}

impl NamePattern {
    /// 解析字符串模式
    ///
    /// 含 `*` 的按通配符处理，否则按精确匹配处理
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            NamePattern::All
        } else if pattern.contains('*') {
            NamePattern::Wildcard(pattern.to_string())
        } else {
            NamePattern::Exact(pattern.to_string())
        }
    }

    /// 检查名称是否匹配
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::All => true,

            NamePattern::Exact(pattern) => pattern == name,

            NamePattern::Wildcard(pattern) => Self::wildcard_matches(pattern, name),

            NamePattern::Pattern(regex) => regex.is_match(name),

            NamePattern::Custom(func) => func(name),

            NamePattern::And(left, right) => left.matches(name) && right.matches(name),

            NamePattern::Or(left, right) => left.matches(name) || right.matches(name),

            NamePattern::Not(inner) => !inner.matches(name),
        }
    }

    /// 简单的通配符匹配（`*` 匹配任意字符串）
    fn wildcard_matches(pattern: &str, target: &str) -> bool {
        if pattern == "*" {
            return true;
        }

        // 将 * 转换为正则表达式
        let regex_pattern = format!("^{}$", regex::escape(pattern).replace("\\*", ".*"));

        if let Ok(regex) = Regex::new(&regex_pattern) {
            regex.is_match(target)
        } else {
            false
        }
    }

    /// 与运算
    pub fn and(self, other: NamePattern) -> Self {
        NamePattern::And(Box::new(self), Box::new(other))
    }

    /// 或运算
    pub fn or(self, other: NamePattern) -> Self {
        NamePattern::Or(Box::new(self), Box::new(other))
    }

    /// 非运算
    pub fn not(self) -> Self {
        NamePattern::Not(Box::new(self))
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamePattern::All => write!(f, "All"),
            NamePattern::Exact(p) => write!(f, "Exact({})", p),
            NamePattern::Wildcard(p) => write!(f, "Wildcard({})", p),
            NamePattern::Pattern(_) => write!(f, "Pattern(...)"),
            NamePattern::Custom(_) => write!(f, "Custom(...)"),
            NamePattern::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            NamePattern::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            NamePattern::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

/// 基于名称模式的切点
///
/// 类过滤器按短类型名匹配，方法匹配器按方法名匹配，
/// 两者都是静态判定
#[derive(Debug, Clone)]
pub struct ExpressionPointcut {
    type_pattern: NamePattern,
    method_pattern: NamePattern,
}

impl ExpressionPointcut {
    /// 创建新的表达式切点
    pub fn new(type_pattern: NamePattern, method_pattern: NamePattern) -> Self {
        Self {
            type_pattern,
            method_pattern,
        }
    }

    /// 创建 execution 表达式
    ///
    /// 例如：`execution("* UserService.get_user(..)")`
    /// 格式：返回类型 类型名.方法名(参数)
    ///
    /// 简化版本，只支持类型和方法名匹配
    pub fn execution(expression: &str) -> Self {
        // 解析表达式: "* UserService.get_user(..)"
        let parts: Vec<&str> = expression.split_whitespace().collect();

        if parts.len() < 2 {
            return Self::new(NamePattern::All, NamePattern::All);
        }

        let member_part = parts[1];
        if let Some((type_pattern, method_pattern)) = member_part.split_once('.') {
            // 移除参数部分 "(..)"
            let method_pattern = method_pattern.trim_end_matches("(..)");

            Self::new(
                NamePattern::parse(type_pattern),
                NamePattern::parse(method_pattern),
            )
        } else {
            Self::new(NamePattern::All, NamePattern::parse(member_part))
        }
    }

    pub fn type_pattern(&self) -> &NamePattern {
        &self.type_pattern
    }

    pub fn method_pattern(&self) -> &NamePattern {
        &self.method_pattern
    }
}

impl ClassFilter for ExpressionPointcut {
    fn matches(&self, target_class: &TargetClass) -> bool {
        self.type_pattern.matches(target_class.short_name())
    }
}

impl MethodMatcher for ExpressionPointcut {
    fn matches(&self, method: &MethodDescriptor, _target_class: &TargetClass) -> bool {
        self.method_pattern.matches(method.name())
    }
}

impl Pointcut for ExpressionPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }
}

/// 参数相关切点
///
/// 在静态切点之上追加一个运行时参数谓词。静态部分在链解析时
/// 判定一次并缓存，参数谓词在每次调用前复查
pub struct DynamicPointcut {
    inner: Arc<dyn Pointcut>,
    matcher: DynamicMethodMatcher,
}

impl DynamicPointcut {
    /// 创建新的参数相关切点
    pub fn new<F>(inner: Arc<dyn Pointcut>, args_predicate: F) -> Self
    where
        F: Fn(&[AnyRef]) -> bool + Send + Sync + 'static,
    {
        Self {
            matcher: DynamicMethodMatcher {
                inner: inner.clone(),
                args_predicate: Arc::new(args_predicate),
            },
            inner,
        }
    }
}

impl Pointcut for DynamicPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self.inner.class_filter()
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        &self.matcher
    }
}

/// 参数相关切点的方法匹配器
struct DynamicMethodMatcher {
    inner: Arc<dyn Pointcut>,
    args_predicate: Arc<dyn Fn(&[AnyRef]) -> bool + Send + Sync>,
}

impl MethodMatcher for DynamicMethodMatcher {
    fn matches(&self, method: &MethodDescriptor, target_class: &TargetClass) -> bool {
        self.inner.method_matcher().matches(method, target_class)
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_args(
        &self,
        method: &MethodDescriptor,
        target_class: &TargetClass,
        args: &[AnyRef],
    ) -> bool {
        self.matches(method, target_class) && (self.args_predicate)(args)
    }
}
