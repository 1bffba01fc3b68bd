use async_trait::async_trait;

use super::{Runtime, inject_wrapper, install_dependencies, probe_command};
use crate::error::{ProbeError, Result};
use crate::types::{InvocationScope, PreparedCommand};

const NAME: &str = "node";
const INTERPRETER: &str = "node";
const MANIFEST: &str = "package.json";

// `.cjs` keeps the wrapper CommonJS even when the project declares `"type": "module"`.
const WRAPPER_EXTENSION: &str = "cjs";

const WRAPPER: &str = r#"const fn = require("./index");

const params = JSON.parse(process.argv[2]);
const ctx = {
  logger: {
    log(message) {
      console.error(message);
    },
  },
};

Promise.resolve(fn.handler(ctx, params)).then((output) => {
  process.stdout.write(JSON.stringify(output === undefined ? null : output) + "\n");
});
"#;

/// Node.js adapter: runs the `handler` exported by `index.js`
#[derive(Debug, Clone, Default)]
pub struct NodeRuntime;

#[async_trait]
impl Runtime for NodeRuntime {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn probe_version(&self) -> std::result::Result<String, ProbeError> {
        probe_command(INTERPRETER, &["-v"]).await
    }

    async fn prepare(&self, scope: InvocationScope<'_>) -> Result<PreparedCommand> {
        install_dependencies(NAME, scope.workdir, MANIFEST, "npm", &["install"]).await?;

        let wrapper = inject_wrapper(NAME, &scope, WRAPPER_EXTENSION, WRAPPER).await?;

        Ok(PreparedCommand::new(INTERPRETER, scope.workdir)
            .arg(wrapper)
            .arg(scope.params_json()))
    }
}
