//! Running hook commands as subprocesses.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::command::{build_command, Placeholders};
use super::HookError;

/// A fully built hook command, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInvocation {
    /// Hook name used in error messages.
    pub hook: String,
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    pub working_dir: PathBuf,
    /// Variables added to the inherited environment.
    pub env: Vec<(String, String)>,
}

/// Executes hook invocations.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion.
    async fn run(&self, invocation: &HookInvocation) -> Result<(), HookError>;
}

/// Runs hooks as child processes with inherited stdio.
///
/// A hook still running after the timeout is killed.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &HookInvocation) -> Result<(), HookError> {
        let hook = invocation.hook.clone();
        let (program, args) =
            invocation
                .argv
                .split_first()
                .ok_or_else(|| HookError::InvalidCommand {
                    hook: hook.clone(),
                    reason: "command is empty".to_string(),
                })?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&invocation.working_dir)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HookError::Launch {
                hook: hook.clone(),
                source,
            })?;

        let waited = tokio::time::timeout(self.timeout, child.wait()).await;
        let status = match waited {
            Ok(status) => status.map_err(|source| HookError::Launch {
                hook: hook.clone(),
                source,
            })?,
            Err(_) => {
                let _ = child.kill().await;
                return Err(HookError::TimedOut {
                    hook,
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(code) => Err(HookError::ExitCode { hook, code }),
            None => Err(HookError::Terminated { hook }),
        }
    }
}

/// Builds hook commands from templates and hands them to a runner.
#[derive(Clone)]
pub struct HookInvoker {
    runner: Arc<dyn CommandRunner>,
}

impl HookInvoker {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Invoke a hook.
    ///
    /// An unset or blank template does nothing. Template errors are
    /// reported before anything is spawned.
    pub async fn invoke(
        &self,
        hook: &str,
        working_dir: &Path,
        template: Option<&str>,
        placeholders: &Placeholders,
        env: &[(String, String)],
    ) -> Result<(), HookError> {
        let Some(template) = template.filter(|t| !t.trim().is_empty()) else {
            return Ok(());
        };

        let argv = build_command(hook, template, placeholders)?;
        if argv.is_empty() {
            return Err(HookError::InvalidCommand {
                hook: hook.to_string(),
                reason: "command expands to nothing".to_string(),
            });
        }

        info!("Running {} hook", hook);
        debug!("Hook command: {:?}", argv);

        let invocation = HookInvocation {
            hook: hook.to_string(),
            argv,
            working_dir: working_dir.to_path_buf(),
            env: env.to_vec(),
        };
        self.runner.run(&invocation).await
    }
}

impl std::fmt::Debug for HookInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookInvoker").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::ListValue;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<HookInvocation>>,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, invocation: &HookInvocation) -> Result<(), HookError> {
            self.calls.lock().unwrap().push(invocation.clone());
            Ok(())
        }
    }

    fn invoker() -> (HookInvoker, Arc<RecordingRunner>) {
        let runner = Arc::new(RecordingRunner::default());
        (HookInvoker::new(runner.clone()), runner)
    }

    #[tokio::test]
    async fn test_invoke_builds_invocation() {
        let (invoker, runner) = invoker();
        let placeholders = Placeholders::new()
            .scalar("title", "Example")
            .list("ids", ListValue::new(["1", "2", "3"]));
        let env = vec![("ITEM_TITLE".to_string(), "Example".to_string())];

        invoker
            .invoke(
                "global on_update",
                Path::new("/srv/feeds"),
                Some("notify {title} {*ids}"),
                &placeholders,
                &env,
            )
            .await
            .unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].hook, "global on_update");
        assert_eq!(calls[0].argv, vec!["notify", "Example", "1", "2", "3"]);
        assert_eq!(calls[0].working_dir, PathBuf::from("/srv/feeds"));
        assert_eq!(calls[0].env, env);
    }

    #[tokio::test]
    async fn test_invoke_without_template_is_noop() {
        let (invoker, runner) = invoker();
        let dir = Path::new(".");

        invoker
            .invoke("h", dir, None, &Placeholders::new(), &[])
            .await
            .unwrap();
        invoker
            .invoke("h", dir, Some("   "), &Placeholders::new(), &[])
            .await
            .unwrap();

        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_template_errors_spawn_nothing() {
        let (invoker, runner) = invoker();
        let placeholders = Placeholders::new().scalar("title", "x");
        let dir = Path::new(".");

        let err = invoker
            .invoke("h", dir, Some("echo {nope}"), &placeholders, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::UnknownPlaceholder { .. }));

        let err = invoker
            .invoke("h", dir, Some("echo {*title}"), &placeholders, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::NotExpandable { .. }));

        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_expansion_is_invalid() {
        let (invoker, runner) = invoker();
        let placeholders = Placeholders::new().list("ids", ListValue::new(Vec::<String>::new()));

        let err = invoker
            .invoke("h", Path::new("."), Some("{*ids}"), &placeholders, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::InvalidCommand { .. }));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        fn invocation(argv: &[&str], dir: &Path) -> HookInvocation {
            HookInvocation {
                hook: "test".to_string(),
                argv: argv.iter().map(|s| s.to_string()).collect(),
                working_dir: dir.to_path_buf(),
                env: vec![("FEEDHOOK_TEST_VALUE".to_string(), "42".to_string())],
            }
        }

        fn runner() -> ProcessRunner {
            ProcessRunner::new(Duration::from_secs(10))
        }

        #[tokio::test]
        async fn test_successful_command() {
            let dir = tempfile::tempdir().unwrap();
            runner()
                .run(&invocation(&["true"], dir.path()))
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn test_environment_and_working_directory() {
            let dir = tempfile::tempdir().unwrap();
            let script = "printf '%s' \"$FEEDHOOK_TEST_VALUE\" > out.txt";
            runner()
                .run(&invocation(&["sh", "-c", script], dir.path()))
                .await
                .unwrap();

            let written = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
            assert_eq!(written, "42");
        }

        #[tokio::test]
        async fn test_non_zero_exit() {
            let dir = tempfile::tempdir().unwrap();
            let err = runner()
                .run(&invocation(&["sh", "-c", "exit 3"], dir.path()))
                .await
                .unwrap_err();
            assert!(matches!(err, HookError::ExitCode { code: 3, .. }));
        }

        #[tokio::test]
        async fn test_missing_program() {
            let dir = tempfile::tempdir().unwrap();
            let err = runner()
                .run(&invocation(&["feedhook-no-such-program"], dir.path()))
                .await
                .unwrap_err();
            assert!(matches!(err, HookError::Launch { .. }));
        }

        #[tokio::test]
        async fn test_timeout_kills_hook() {
            let dir = tempfile::tempdir().unwrap();
            let err = ProcessRunner::new(Duration::from_millis(200))
                .run(&invocation(&["sleep", "5"], dir.path()))
                .await
                .unwrap_err();
            assert!(matches!(err, HookError::TimedOut { .. }));
        }
    }
}
