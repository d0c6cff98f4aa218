//! Environment registry for easy environment creation

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use curricula_core::{Environment, RLError, Result};

use crate::cartpole::CartPoleEnv;
use crate::grid::GridWalkEnv;
use crate::wrappers::TimeLimit;

/// Free-form constructor arguments
pub type EnvArgs = serde_json::Map<String, serde_json::Value>;

type EnvConstructor = Box<dyn Fn(&EnvArgs) -> Result<Box<dyn Environment>> + Send + Sync>;

lazy_static::lazy_static! {
    static ref REGISTRY: Arc<Mutex<EnvRegistry>> = Arc::new(Mutex::new(EnvRegistry::with_builtins()));
}

/// Serializable description of an environment instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvSpec {
    /// Registered environment name
    pub name: String,
    /// Constructor arguments
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub args: EnvArgs,
    /// Optional episode step limit applied through [`TimeLimit`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_episode_steps: Option<usize>,
}

impl EnvSpec {
    /// Spec with no arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: EnvArgs::new(),
            max_episode_steps: None,
        }
    }

    /// Add a constructor argument
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Set the episode step limit
    #[must_use]
    pub fn with_max_episode_steps(mut self, max_steps: usize) -> Self {
        self.max_episode_steps = Some(max_steps);
        self
    }

    /// Build the environment through the global registry
    pub fn make(&self) -> Result<Box<dyn Environment>> {
        make_env(self)
    }
}

/// Decode constructor arguments into a typed configuration
pub fn parse_args<T: serde::de::DeserializeOwned>(args: &EnvArgs) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(args.clone()))
        .map_err(|e| RLError::InvalidConfig(format!("invalid environment arguments: {e}")))
}

/// Environment registry
pub struct EnvRegistry {
    /// Registered environments
    envs: HashMap<String, EnvConstructor>,
}

impl EnvRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            envs: HashMap::new(),
        }
    }

    /// Registry preloaded with the environments of this crate
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(GridWalkEnv::NAME, |args| Ok(Box::new(GridWalkEnv::new(parse_args(args)?)?)));
        registry.register(CartPoleEnv::NAME, |args| Ok(Box::new(CartPoleEnv::new(parse_args(args)?)?)));
        registry
    }

    /// Register an environment
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&EnvArgs) -> Result<Box<dyn Environment>> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(env = %name, "registered environment");
        self.envs.insert(name, Box::new(constructor));
    }

    /// Create an environment from its spec
    pub fn make(&self, spec: &EnvSpec) -> Result<Box<dyn Environment>> {
        let constructor = self
            .envs
            .get(&spec.name)
            .ok_or_else(|| RLError::UnknownEnvironment(spec.name.clone()))?;
        let env = constructor(&spec.args)?;
        Ok(match spec.max_episode_steps {
            Some(max_steps) => Box::new(TimeLimit::new(env, max_steps)),
            None => env,
        })
    }

    /// List registered environments
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.envs.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for EnvRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn with_registry<T>(f: impl FnOnce(&mut EnvRegistry) -> T) -> Result<T> {
    let mut guard = REGISTRY
        .lock()
        .map_err(|_| RLError::Environment("environment registry lock poisoned".into()))?;
    Ok(f(&mut guard))
}

/// Register an environment globally
pub fn register_env<F>(name: impl Into<String>, constructor: F) -> Result<()>
where
    F: Fn(&EnvArgs) -> Result<Box<dyn Environment>> + Send + Sync + 'static,
{
    with_registry(|registry| registry.register(name, constructor))
}

/// Create an environment from its spec
pub fn make_env(spec: &EnvSpec) -> Result<Box<dyn Environment>> {
    with_registry(|registry| registry.make(spec))?
}

/// List all registered environments
pub fn list_envs() -> Result<Vec<String>> {
    with_registry(|registry| registry.list())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let names = list_envs().unwrap();
        assert!(names.contains(&GridWalkEnv::NAME.to_string()));
        assert!(names.contains(&CartPoleEnv::NAME.to_string()));
    }

    #[test]
    fn test_unknown_environment() {
        let err = make_env(&EnvSpec::new("lava_crossing")).err().unwrap();
        assert!(matches!(err, RLError::UnknownEnvironment(name) if name == "lava_crossing"));
    }

    #[test]
    fn test_bad_arguments_rejected() {
        let spec = EnvSpec::new(GridWalkEnv::NAME).with_arg("difficulty", "hard");
        assert!(matches!(make_env(&spec), Err(RLError::InvalidConfig(_))));
    }

    #[test]
    fn test_spec_yaml_shape() {
        let spec: EnvSpec = serde_yaml::from_str(
            "name: grid_walk\nargs:\n  difficulty: 1\n  seed: 3\nmax_episode_steps: 50\n",
        )
        .unwrap();
        assert_eq!(spec.args["difficulty"], 1);
        assert_eq!(spec.max_episode_steps, Some(50));
        let env = spec.make().unwrap();
        assert_eq!(env.n_actions(), 4);
    }

    #[tokio::test]
    async fn test_custom_registration() {
        register_env("custom_cart_pole", |args| Ok(Box::new(CartPoleEnv::new(parse_args(args)?)?))).unwrap();
        let mut env = make_env(&EnvSpec::new("custom_cart_pole")).unwrap();
        assert_eq!(env.reset().await.unwrap().len(), 4);
    }
}
