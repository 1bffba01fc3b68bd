use async_trait::async_trait;

use super::{Runtime, inject_wrapper, install_dependencies, probe_command};
use crate::error::{ProbeError, Result};
use crate::types::{InvocationScope, PreparedCommand};

const NAME: &str = "python";
const INTERPRETER: &str = "python3";
const MANIFEST: &str = "requirements.txt";
const WRAPPER_EXTENSION: &str = "py";

const WRAPPER: &str = r#"import json
import sys

from main import handler


class Logger:
    def log(self, message):
        print(message, file=sys.stderr, flush=True)


class Context(dict):
    def __init__(self, *args, **kwargs):
        super().__init__(*args, **kwargs)
        self.logger = Logger()

    def __getattr__(self, name):
        try:
            return self[name]
        except KeyError:
            raise AttributeError(
                f"'{self.__class__.__name__}' object has no attribute '{name}'"
            ) from None


params = json.loads(sys.argv[1])

print(json.dumps(handler(Context(), params)))
"#;

/// Python adapter: runs the `handler` defined in `main.py`
#[derive(Debug, Clone, Default)]
pub struct PythonRuntime;

#[async_trait]
impl Runtime for PythonRuntime {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn probe_version(&self) -> std::result::Result<String, ProbeError> {
        probe_command(
            INTERPRETER,
            &["-c", "import platform; print(platform.python_version())"],
        )
        .await
    }

    async fn prepare(&self, scope: InvocationScope<'_>) -> Result<PreparedCommand> {
        install_dependencies(
            NAME,
            scope.workdir,
            MANIFEST,
            INTERPRETER,
            &["-m", "pip", "install", "-r", MANIFEST],
        )
        .await?;

        let wrapper = inject_wrapper(NAME, &scope, WRAPPER_EXTENSION, WRAPPER).await?;

        Ok(PreparedCommand::new(INTERPRETER, scope.workdir)
            .arg(wrapper)
            .arg(scope.params_json()))
    }
}
