use std::sync::atomic::Ordering;
use std::time::Duration;

use logmon_common::{LogmonSettings, RetrySettings};
use logmon_hook::{
    HookError, HookState, InternalCapabilities, TaskHook, TaskPrestartHook, TaskPrestartRequest,
    REATTACH_KEY,
};
use logmon_manager::HandleState;
use logmon_plugin::PluginError;
use tokio::time::Instant;

mod fixtures;
use fixtures::{
    hook, hook_from_settings, hook_with, pid_in, state_for, task, FakeCatalog, StaticDriver,
    FIRST_PID,
};

fn request(previous_state: Option<HookState>) -> TaskPrestartRequest {
    TaskPrestartRequest {
        task: task(),
        previous_state,
    }
}

fn unavailable() -> PluginError {
    PluginError::Unavailable("connection refused".into())
}

#[tokio::test]
async fn disabled_log_collection_never_dispenses() {
    let catalog = FakeCatalog::new();
    let hook = hook_with(
        catalog.clone(),
        StaticDriver(Some(InternalCapabilities {
            disable_log_collection: true,
        })),
    );

    let resp = hook.prestart(&request(Some(state_for(42)))).await.unwrap();
    assert!(resp.state.is_none());
    assert!(catalog.events().is_empty());
    assert_eq!(hook.plugin_state().await, HandleState::Unlaunched);
}

#[tokio::test]
async fn driver_capabilities_without_opt_out_still_collect() {
    let catalog = FakeCatalog::new();
    let hook = hook_with(
        catalog.clone(),
        StaticDriver(Some(InternalCapabilities::default())),
    );

    hook.prestart(&request(None)).await.unwrap();
    assert_eq!(catalog.count("launch"), 1);
}

#[tokio::test]
async fn fresh_launch_persists_descriptor() {
    let catalog = FakeCatalog::new();
    let hook = hook(catalog.clone());
    assert_eq!(hook.name(), "logmon");

    let resp = hook.prestart(&request(None)).await.unwrap();
    assert_eq!(
        catalog.events(),
        vec![format!("launch:{FIRST_PID}"), format!("start:{FIRST_PID}")]
    );

    let state = resp.state.unwrap();
    assert_eq!(state.len(), 1);
    assert_eq!(pid_in(&state), FIRST_PID);
    assert_eq!(hook.plugin_state().await, HandleState::Running);
}

#[tokio::test]
async fn start_receives_task_log_config() {
    let catalog = FakeCatalog::new();
    let hook = hook(catalog.clone());
    hook.prestart(&request(None)).await.unwrap();

    let configs = catalog.started_configs();
    assert_eq!(configs.len(), 1);
    let cfg = &configs[0];
    assert_eq!(cfg.stdout_file_name, "redis.stdout");
    assert_eq!(cfg.stderr_file_name, "redis.stderr");
    assert_eq!(cfg.max_files, 5);
    assert_eq!(cfg.max_file_size_mb, 20);
    assert!(cfg.stdout_fifo.contains("redis"));
    assert!(cfg.stderr_fifo.contains("redis"));
    assert_ne!(cfg.stdout_fifo, cfg.stderr_fifo);
}

#[tokio::test]
async fn previous_state_reattaches_instead_of_launching() {
    let catalog = FakeCatalog::new();
    let hook = hook(catalog.clone());

    let resp = hook.prestart(&request(Some(state_for(42)))).await.unwrap();
    assert_eq!(catalog.events(), vec!["reattach:42", "start:42"]);
    assert_eq!(pid_in(&resp.state.unwrap()), 42);
}

#[tokio::test]
async fn failed_reattach_falls_back_to_launch() {
    let catalog = FakeCatalog::new();
    catalog.fail_reattach.store(true, Ordering::SeqCst);
    let hook = hook(catalog.clone());

    let resp = hook.prestart(&request(Some(state_for(42)))).await.unwrap();
    assert_eq!(
        catalog.events(),
        vec![
            "reattach:42".to_string(),
            format!("launch:{FIRST_PID}"),
            format!("start:{FIRST_PID}"),
        ]
    );
    assert_eq!(pid_in(&resp.state.unwrap()), FIRST_PID);
}

#[tokio::test]
async fn malformed_state_falls_back_to_launch() {
    let catalog = FakeCatalog::new();
    let hook = hook(catalog.clone());
    let state = HookState::from([(REATTACH_KEY.to_string(), "{\"pid\":".to_string())]);

    hook.prestart(&request(Some(state))).await.unwrap();
    assert_eq!(catalog.count("reattach"), 0);
    assert_eq!(catalog.count("launch"), 1);
}

#[tokio::test]
async fn empty_state_skips_reattach() {
    let catalog = FakeCatalog::new();
    let hook = hook(catalog.clone());
    let state = HookState::from([(REATTACH_KEY.to_string(), String::new())]);

    hook.prestart(&request(Some(state))).await.unwrap();
    hook.prestart(&request(Some(HookState::new()))).await.unwrap();
    assert_eq!(catalog.count("reattach"), 0);
    assert_eq!(catalog.count("launch"), 1);
}

#[tokio::test]
async fn held_plugin_is_reused() {
    let catalog = FakeCatalog::new();
    let hook = hook(catalog.clone());

    hook.prestart(&request(None)).await.unwrap();
    hook.prestart(&request(Some(state_for(42)))).await.unwrap();
    assert_eq!(catalog.count("launch"), 1);
    assert_eq!(catalog.count("reattach"), 0);
    assert_eq!(catalog.count("start"), 2);
}

#[tokio::test(start_paused = true)]
async fn transport_shutdown_relaunches_after_backoff() {
    let catalog = FakeCatalog::new();
    catalog.script_starts([Err(unavailable()), Err(PluginError::PluginShutdown)]);
    let hook = hook(catalog.clone());

    let began = Instant::now();
    let resp = hook.prestart(&request(None)).await.unwrap();
    assert_eq!(began.elapsed(), Duration::from_secs(2));

    let (first, second, third) = (FIRST_PID, FIRST_PID + 1, FIRST_PID + 2);
    assert_eq!(
        catalog.events(),
        vec![
            format!("launch:{first}"),
            format!("start:{first}"),
            format!("stop:{first}"),
            format!("kill:{first}"),
            format!("launch:{second}"),
            format!("start:{second}"),
            format!("stop:{second}"),
            format!("kill:{second}"),
            format!("launch:{third}"),
            format!("start:{third}"),
        ]
    );
    assert_eq!(pid_in(&resp.state.unwrap()), third);
}

#[tokio::test(start_paused = true)]
async fn three_transport_shutdowns_still_succeed() {
    let catalog = FakeCatalog::new();
    catalog.script_starts([
        Err(unavailable()),
        Err(PluginError::PluginShutdown),
        Err(unavailable()),
    ]);
    let hook = hook(catalog.clone());

    let began = Instant::now();
    let resp = hook.prestart(&request(None)).await.unwrap();
    assert_eq!(began.elapsed(), Duration::from_secs(3));

    let mut expected = Vec::new();
    for pid in FIRST_PID..FIRST_PID + 3 {
        expected.extend([
            format!("launch:{pid}"),
            format!("start:{pid}"),
            format!("stop:{pid}"),
            format!("kill:{pid}"),
        ]);
    }
    expected.extend([
        format!("launch:{}", FIRST_PID + 3),
        format!("start:{}", FIRST_PID + 3),
    ]);
    assert_eq!(catalog.events(), expected);
    assert_eq!(pid_in(&resp.state.unwrap()), FIRST_PID + 3);
    assert_eq!(hook.plugin_state().await, HandleState::Running);
}

#[tokio::test(start_paused = true)]
async fn persistent_transport_shutdown_gives_up() {
    let catalog = FakeCatalog::new();
    catalog.script_starts((0..5).map(|_| Err(unavailable())));
    let hook = hook(catalog.clone());

    let began = Instant::now();
    let err = hook.prestart(&request(None)).await.unwrap_err();
    assert_eq!(began.elapsed(), Duration::from_secs(3));

    assert!(matches!(err, HookError::Plugin(PluginError::Unavailable(_))));
    assert!(!err.is_recoverable());
    assert_eq!(catalog.count("start"), 4);
    assert_eq!(catalog.count("launch"), 4);
}

#[tokio::test(start_paused = true)]
async fn retry_bound_and_backoff_are_configurable() {
    let catalog = FakeCatalog::new();
    catalog.script_starts((0..5).map(|_| Err(PluginError::PluginShutdown)));
    let hook = hook(catalog.clone()).with_retry(RetrySettings {
        max_retries: 1,
        backoff_ms: 250,
    });

    let began = Instant::now();
    let err = hook.prestart(&request(None)).await.unwrap_err();
    assert_eq!(began.elapsed(), Duration::from_millis(250));
    assert!(matches!(err, HookError::Plugin(PluginError::PluginShutdown)));
    assert_eq!(catalog.count("start"), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_section_of_settings_file_is_honoured() {
    let settings = LogmonSettings::from_toml_str(
        r#"
            [retry]
            max_retries = 1
            backoff_ms = 500
        "#,
    )
    .unwrap();
    let catalog = FakeCatalog::new();
    catalog.script_starts((0..5).map(|_| Err(unavailable())));
    let hook = hook_from_settings(catalog.clone(), StaticDriver(None), &settings);

    let began = Instant::now();
    let err = hook.prestart(&request(None)).await.unwrap_err();
    assert_eq!(began.elapsed(), Duration::from_millis(500));
    assert!(matches!(err, HookError::Plugin(PluginError::Unavailable(_))));
    assert_eq!(catalog.count("start"), 2);
    assert_eq!(catalog.count("kill"), 1);
}

#[tokio::test(start_paused = true)]
async fn application_error_is_fatal_without_retry() {
    let catalog = FakeCatalog::new();
    catalog.script_starts([Err(PluginError::Remote {
        call: "start",
        message: "permission denied".into(),
    })]);
    let hook = hook(catalog.clone());

    let began = Instant::now();
    let err = hook.prestart(&request(None)).await.unwrap_err();
    assert_eq!(began.elapsed(), Duration::ZERO);

    assert!(matches!(err, HookError::Plugin(PluginError::Remote { .. })));
    assert_eq!(catalog.count("start"), 1);
    assert_eq!(catalog.count("kill"), 0);
}

#[tokio::test]
async fn launch_failure_is_recoverable() {
    let catalog = FakeCatalog::new();
    catalog.fail_launch.store(true, Ordering::SeqCst);
    let hook = hook(catalog.clone());

    let err = hook.prestart(&request(None)).await.unwrap_err();
    assert!(matches!(err, HookError::Launch(_)));
    assert!(err.is_recoverable());
    assert_eq!(catalog.count("start"), 0);
}

#[tokio::test]
async fn shut_down_manager_fails_launch() {
    let catalog = FakeCatalog::new();
    let hook = hook(catalog.clone());
    hook.manager().shutdown();

    let err = hook.prestart(&request(Some(state_for(42)))).await.unwrap_err();
    assert!(matches!(err, HookError::Launch(_)));
    assert!(catalog.events().is_empty());
}
