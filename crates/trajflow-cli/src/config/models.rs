use trajflow::engine::config::RunConfig;
use trajflow::workflows::process::ScriptInput;

#[derive(Debug)]
pub struct AppConfig {
    pub script: ScriptInput,
    pub core_config: RunConfig,
}
