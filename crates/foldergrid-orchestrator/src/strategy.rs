//! Deployment strategies.
//!
//! A strategy turns a persisted `DeploymentConfig` into a concrete
//! build/run plan. Plans are pure functions of the instance identity and
//! its config, so a config reloaded from the registry yields the same plan.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use foldergrid_core::{BuildDescriptor, DeploymentConfig, PortMapping, ServiceType};
use foldergrid_registry::ServiceInstance;

use crate::engine::{BuildRequest, DescriptorSource, RunRequest};
use crate::error::{OrchestratorError, OrchestratorResult};

/// Label carrying the owning instance id on every container.
pub const INSTANCE_LABEL: &str = "foldergrid.instance";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub tag: String,
    /// Workspace-relative build context.
    pub context: String,
    pub descriptor: DescriptorSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub name: String,
    pub ports: Vec<PortMapping>,
    pub env: BTreeMap<String, String>,
    pub memory_mb: u64,
    pub cpu_millis: u32,
    pub replicas: u32,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub strategy: &'static str,
    pub build: BuildPlan,
    pub run: RunPlan,
}

impl DeploymentPlan {
    pub fn build_request(&self, workspace_root: &Path) -> BuildRequest {
        BuildRequest {
            tag: self.build.tag.clone(),
            context: workspace_root.join(&self.build.context),
            descriptor: self.build.descriptor.clone(),
        }
    }

    pub fn run_request(&self, image: &str) -> RunRequest {
        RunRequest {
            image: image.to_string(),
            name: self.run.name.clone(),
            ports: self.run.ports.clone(),
            env: self.run.env.clone(),
            memory_mb: self.run.memory_mb,
            cpu_millis: self.run.cpu_millis,
            labels: self.run.labels.clone(),
        }
    }
}

pub trait DeploymentStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn plan(
        &self,
        instance: &ServiceInstance,
        config: &DeploymentConfig,
    ) -> OrchestratorResult<DeploymentPlan>;
}

/// Builds from the descriptor file in the folder; the folder is the context.
#[derive(Debug, Default)]
pub struct ExplicitDescriptorStrategy;

impl DeploymentStrategy for ExplicitDescriptorStrategy {
    fn name(&self) -> &'static str {
        "explicit-descriptor"
    }

    fn plan(
        &self,
        instance: &ServiceInstance,
        config: &DeploymentConfig,
    ) -> OrchestratorResult<DeploymentPlan> {
        let BuildDescriptor::Explicit { path } = &config.build.descriptor else {
            return Err(OrchestratorError::Validation(format!(
                "instance {} has no descriptor file to build from",
                instance.id
            )));
        };
        Ok(DeploymentPlan {
            strategy: self.name(),
            build: BuildPlan {
                tag: image_tag(instance),
                context: config.build.context.clone(),
                descriptor: DescriptorSource::File(path.clone()),
            },
            run: run_plan(instance, config),
        })
    }
}

/// Synthesizes a minimal descriptor from the runtime hints in the config.
#[derive(Debug)]
pub struct RuntimeStrategy {
    workdir: &'static str,
}

impl RuntimeStrategy {
    pub fn new(workdir: &'static str) -> Self {
        Self { workdir }
    }

    pub fn render(&self, config: &DeploymentConfig) -> OrchestratorResult<String> {
        let BuildDescriptor::Synthesized {
            base_image,
            install_command,
            start_command,
        } = &config.build.descriptor
        else {
            return Err(OrchestratorError::Validation(
                "runtime strategy needs a synthesized descriptor".to_string(),
            ));
        };

        let mut out = format!("FROM {base_image}\nWORKDIR {}\nCOPY . .\n", self.workdir);
        if let Some(install) = install_command {
            out.push_str(&format!("RUN {install}\n"));
        }
        for port in &config.ports {
            out.push_str(&format!("EXPOSE {}\n", port.container_port));
        }
        let quoted = start_command.replace('\\', "\\\\").replace('"', "\\\"");
        out.push_str(&format!("CMD [\"sh\", \"-c\", \"{quoted}\"]\n"));
        Ok(out)
    }
}

impl DeploymentStrategy for RuntimeStrategy {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn plan(
        &self,
        instance: &ServiceInstance,
        config: &DeploymentConfig,
    ) -> OrchestratorResult<DeploymentPlan> {
        // An explicit descriptor always wins over synthesis.
        let descriptor = match &config.build.descriptor {
            BuildDescriptor::Explicit { path } => DescriptorSource::File(path.clone()),
            BuildDescriptor::Synthesized { .. } => DescriptorSource::Inline(self.render(config)?),
        };
        Ok(DeploymentPlan {
            strategy: self.name(),
            build: BuildPlan {
                tag: image_tag(instance),
                context: config.build.context.clone(),
                descriptor,
            },
            run: run_plan(instance, config),
        })
    }
}

/// Strategies keyed by service type.
pub struct StrategyRegistry {
    strategies: HashMap<ServiceType, Arc<dyn DeploymentStrategy>>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Every deployable service type with its default strategy.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(ServiceType::Containerized, Arc::new(ExplicitDescriptorStrategy));
        let app = Arc::new(RuntimeStrategy::new("/app"));
        for service_type in [
            ServiceType::Node,
            ServiceType::Python,
            ServiceType::Go,
            ServiceType::Rust,
        ] {
            registry.register(service_type, app.clone());
        }
        registry.register(
            ServiceType::Static,
            Arc::new(RuntimeStrategy::new("/usr/share/nginx/html")),
        );
        registry
    }

    pub fn register(&mut self, service_type: ServiceType, strategy: Arc<dyn DeploymentStrategy>) {
        self.strategies.insert(service_type, strategy);
    }

    pub fn get(&self, service_type: ServiceType) -> OrchestratorResult<Arc<dyn DeploymentStrategy>> {
        self.strategies.get(&service_type).cloned().ok_or_else(|| {
            OrchestratorError::Validation(format!("no deployment strategy for {service_type} services"))
        })
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn short_id(instance: &ServiceInstance) -> &str {
    instance.id.get(..8).unwrap_or(&instance.id)
}

fn slug(name: &str) -> String {
    let slug: String = name
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() { "service".to_string() } else { slug.to_string() }
}

fn image_tag(instance: &ServiceInstance) -> String {
    format!("foldergrid/{}:{}", slug(&instance.name), short_id(instance))
}

fn run_plan(instance: &ServiceInstance, config: &DeploymentConfig) -> RunPlan {
    RunPlan {
        name: format!("fg-{}-{}", slug(&instance.name), short_id(instance)),
        ports: config.ports.clone(),
        env: config.env.clone(),
        memory_mb: config.resources.memory_mb,
        cpu_millis: config.resources.cpu_millis,
        replicas: config.scaling.replicas,
        labels: BTreeMap::from([(INSTANCE_LABEL.to_string(), instance.id.clone())]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldergrid_core::{BuildSpec, HealthCheckSpec, HealthProbe, ResourceLimits, ScalingSpec};

    fn synthesized_config() -> DeploymentConfig {
        DeploymentConfig {
            build: BuildSpec {
                context: "apps/web".to_string(),
                descriptor: BuildDescriptor::Synthesized {
                    base_image: "node:20-alpine".to_string(),
                    install_command: Some("npm ci --omit=dev".to_string()),
                    start_command: "npm start".to_string(),
                },
            },
            ports: vec![PortMapping::tcp(3000)],
            env: BTreeMap::from([("PORT".to_string(), "3000".to_string())]),
            resources: ResourceLimits::default(),
            health_check: HealthCheckSpec::for_probe(HealthProbe::Tcp { port: 3000 }),
            scaling: ScalingSpec::default(),
            low_confidence: true,
        }
    }

    fn instance() -> ServiceInstance {
        ServiceInstance::new("ws", "My Web!", "apps/web", ServiceType::Node)
    }

    #[test]
    fn runtime_strategy_renders_descriptor() {
        let text = RuntimeStrategy::new("/app").render(&synthesized_config()).unwrap();
        assert_eq!(
            text,
            "FROM node:20-alpine\nWORKDIR /app\nCOPY . .\nRUN npm ci --omit=dev\nEXPOSE 3000\nCMD [\"sh\", \"-c\", \"npm start\"]\n"
        );
    }

    #[test]
    fn plan_names_are_slugged_and_stable() {
        let inst = instance();
        let registry = StrategyRegistry::with_defaults();
        let strategy = registry.get(ServiceType::Node).unwrap();
        let a = strategy.plan(&inst, &synthesized_config()).unwrap();
        let b = strategy.plan(&inst, &synthesized_config()).unwrap();
        assert_eq!(a, b);
        assert!(a.build.tag.starts_with("foldergrid/my-web:"));
        assert!(a.run.name.starts_with("fg-my-web-"));
        assert_eq!(a.run.labels[INSTANCE_LABEL], inst.id);
    }

    #[test]
    fn explicit_strategy_rejects_synthesized_config() {
        let err = ExplicitDescriptorStrategy
            .plan(&instance(), &synthesized_config())
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
    }

    #[test]
    fn missing_strategy_is_a_validation_error() {
        let registry = StrategyRegistry::with_defaults();
        assert!(matches!(
            registry.get(ServiceType::Composite),
            Err(OrchestratorError::Validation(_))
        ));
        assert!(StrategyRegistry::empty().get(ServiceType::Node).is_err());
    }

    #[test]
    fn build_request_resolves_context_against_root() {
        let plan = StrategyRegistry::with_defaults()
            .get(ServiceType::Node)
            .unwrap()
            .plan(&instance(), &synthesized_config())
            .unwrap();
        let request = plan.build_request(Path::new("/srv/ws"));
        assert_eq!(request.context, Path::new("/srv/ws/apps/web"));
    }
}
