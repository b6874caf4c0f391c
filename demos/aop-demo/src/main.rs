use std::sync::Arc;
use std::time::Instant;

use wyvern_aop::prelude::*;
use wyvern_aop::{AdvisorRegistration, ContractRegistration};

// ==================== 业务服务 ====================

#[derive(Debug, Clone)]
struct User {
    id: u32,
    name: String,
}

/// 用户服务 - 将被自动代理的业务类型
struct UserService {
    users: Vec<User>,
}

impl UserService {
    fn new() -> Self {
        Self {
            users: vec![
                User {
                    id: 1,
                    name: "alice".to_string(),
                },
                User {
                    id: 2,
                    name: "bob".to_string(),
                },
            ],
        }
    }

    fn find_user(&self, id: u32) -> anyhow::Result<User> {
        self.users
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("user {} not found", id))
    }

    fn user_count(&self) -> usize {
        self.users.len()
    }
}

// ==================== 契约 ====================
// 过程宏通常生成的分发代码，这里手写等价物

fn user_service_contract() -> Arc<Contract> {
    Contract::builder::<UserService>("UserService")
        .method("find_user", |target, args| {
            let service = downcast_target::<UserService>(target)?;
            let id = downcast_arg::<u32>(args, 0)?;
            Ok(Arc::new(service.find_user(*id)?) as AnyRef)
        })
        .method("user_count", |target, _args| {
            let service = downcast_target::<UserService>(target)?;
            Ok(Arc::new(service.user_count()) as AnyRef)
        })
        .build()
}

wyvern_aop::inventory::submit! {
    ContractRegistration::new("UserService", user_service_contract)
}

// ==================== 切面 ====================

/// 日志环绕拦截器 - 记录进入/退出与耗时
struct LoggingInterceptor;

impl MethodInterceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "LoggingInterceptor"
    }

    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<AnyRef> {
        let signature = invocation.method().signature();
        tracing::info!("🔵 [AOP-Logging] → Entering: {}", signature);
        let started = Instant::now();

        let result = invocation.proceed();

        tracing::info!(
            "🔵 [AOP-Logging] ← Exiting: {} (took {:?})",
            signature,
            started.elapsed()
        );
        result
    }
}

fn logging_advisor() -> Arc<Advisor> {
    Arc::new(
        Advisor::new(
            "LoggingAdvisor",
            AdviceKind::Around(Arc::new(LoggingInterceptor)),
            Arc::new(ExpressionPointcut::execution("* *Service.*(..)")),
        )
        .with_order(1),
    )
}

wyvern_aop::inventory::submit! {
    AdvisorRegistration::new("LoggingAdvisor", logging_advisor)
}

/// 参数校验前置通知 - 拒绝 id 为 0 的查询
struct IdValidationAdvice;

impl BeforeAdvice for IdValidationAdvice {
    fn name(&self) -> &str {
        "IdValidationAdvice"
    }

    fn before(
        &self,
        method: &MethodDescriptor,
        args: &[AnyRef],
        _target: Option<&AnyRef>,
    ) -> anyhow::Result<()> {
        if let Some(id) = args.first().and_then(|arg| arg.downcast_ref::<u32>()) {
            if *id == 0 {
                anyhow::bail!("invalid id 0 passed to {}", method);
            }
        }
        Ok(())
    }
}

fn validation_advisor() -> Arc<Advisor> {
    Arc::new(
        Advisor::new(
            "ValidationAdvisor",
            AdviceKind::Before(Arc::new(IdValidationAdvice)),
            Arc::new(ExpressionPointcut::execution("* UserService.find_user(..)")),
        )
        .with_order(10),
    )
}

wyvern_aop::inventory::submit! {
    AdvisorRegistration::new("ValidationAdvisor", validation_advisor)
}

/// 异常审计通知 - 记录所有失败的调用
struct FailureAuditAdvice;

impl AfterThrowingAdvice for FailureAuditAdvice {
    fn name(&self) -> &str {
        "FailureAuditAdvice"
    }

    fn after_throwing(
        &self,
        method: &MethodDescriptor,
        _args: &[AnyRef],
        _target: Option<&AnyRef>,
        error: &anyhow::Error,
    ) {
        let info = ErrorInfo::from_error(error);
        tracing::error!("❌ [AOP-Audit] {} failed: {}", method, info.full_description());
    }
}

fn audit_advisor() -> Arc<Advisor> {
    Arc::new(
        Advisor::new(
            "FailureAuditAdvisor",
            AdviceKind::AfterThrowing(Arc::new(FailureAuditAdvice)),
            Arc::new(ExpressionPointcut::execution("* *Service.*(..)")),
        )
        .with_order(20),
    )
}

wyvern_aop::inventory::submit! {
    AdvisorRegistration::new("FailureAuditAdvisor", audit_advisor)
}

// ==================== 入口 ====================

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("🚀 Wyvern AOP demo starting...");

    // 决策门使用全局注册表（inventory 提交的契约与 Advisor 自动加载）
    let advisor_source: Arc<dyn CandidateAdvisorSource> = get_global_registry().clone();
    let gate = AutoProxyCreator::new(advisor_source);

    // 模拟容器：实例就绪后交给决策门
    let instance: AnyRef = Arc::new(UserService::new());
    let bean = gate.process_instance(instance, "userService")?;

    let proxy = bean
        .downcast_ref::<ContractProxy>()
        .ok_or_else(|| anyhow::anyhow!("userService was not proxied"))?;
    println!(
        "✅ userService proxied, {} contract(s), {} advisor(s)",
        proxy.contracts().len(),
        proxy.advised().advisor_count()
    );

    // 正常调用：日志环绕 + 校验通过
    let args: Vec<AnyRef> = vec![Arc::new(1u32)];
    let user = proxy.invoke_named("UserService", "find_user", &args)?;
    if let Some(user) = user.downcast_ref::<User>() {
        println!("📋 Found user #{}: {}", user.id, user.name);
    }

    // 无参方法同样经过日志切面
    let count = proxy.invoke_named("UserService", "user_count", &[])?;
    if let Some(count) = count.downcast_ref::<usize>() {
        println!("📋 User count: {}", count);
    }

    // 校验失败：前置通知短路了目标调用
    let args: Vec<AnyRef> = vec![Arc::new(0u32)];
    if let Err(error) = proxy.invoke_named("UserService", "find_user", &args) {
        println!("🛑 Validation rejected the call: {}", error);
    }

    // 目标自身报错：异常审计观察后原样传播
    let args: Vec<AnyRef> = vec![Arc::new(999u32)];
    if let Err(error) = proxy.invoke_named("UserService", "find_user", &args) {
        println!("🛑 Lookup failed as expected: {}", error);
    }

    println!("🏁 Wyvern AOP demo finished");
    Ok(())
}
