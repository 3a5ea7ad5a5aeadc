use crate::{
    bundle::DesiredBundle,
    jaeger::{DeploymentStrategy, Jaeger},
    Error, Result,
};
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{
            ConfigMap, Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec,
            Service, ServiceAccount, ServicePort, ServiceSpec, Volume, VolumeMount,
        },
        networking::v1::{
            Ingress, IngressBackend, IngressServiceBackend, IngressSpec as NetIngressSpec, ServiceBackendPort,
        },
    },
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
};
use kube::{api::ObjectMeta, ResourceExt};
use std::collections::BTreeMap;

/// Computes the desired objects of a Jaeger instance. Must be pure: the
/// result only depends on the instance it is given.
pub trait StrategyProvider: Send + Sync {
    fn compute_desired(&self, jaeger: &Jaeger) -> Result<DesiredBundle>;
}

pub static JAEGER_VERSION: &str = "1.62.0";
static SAMPLING_MOUNT: &str = "/etc/jaeger/sampling";
static DEFAULT_SAMPLING: &str = r#"{"default_strategy":{"param":1,"type":"probabilistic"}}"#;

const QUERY_PORT: i32 = 16686;
const COLLECTOR_PORTS: [(&str, i32); 5] = [
    ("grpc", 14250),
    ("http", 14268),
    ("otlp-grpc", 4317),
    ("otlp-http", 4318),
    ("zipkin", 9411),
];
const AGENT_PORTS: [(&str, i32, &str); 3] = [
    ("compact", 6831, "UDP"),
    ("binary", 6832, "UDP"),
    ("configs", 5778, "TCP"),
];

/// Built-in topologies: all-in-one and production
#[derive(Clone, Debug, Default)]
pub struct DefaultStrategy;

impl StrategyProvider for DefaultStrategy {
    fn compute_desired(&self, jaeger: &Jaeger) -> Result<DesiredBundle> {
        let ctx = Rendering::new(jaeger);
        match jaeger.spec.strategy {
            DeploymentStrategy::AllInOne => ctx.all_in_one(),
            DeploymentStrategy::Production => {
                if !jaeger.spec.storage.storage_type.is_persistent() {
                    return Err(Error::Strategy(format!(
                        "production strategy for {} requires a persistent storage",
                        ctx.name
                    )));
                }
                ctx.production()
            }
            DeploymentStrategy::Streaming => Err(Error::Strategy(format!(
                "streaming strategy for {} requires a kafka provisioner",
                ctx.name
            ))),
        }
    }
}

struct Rendering<'a> {
    jaeger: &'a Jaeger,
    name: String,
    namespace: Option<String>,
}

impl<'a> Rendering<'a> {
    fn new(jaeger: &'a Jaeger) -> Self {
        Self {
            jaeger,
            name: jaeger.name_any(),
            namespace: jaeger.namespace(),
        }
    }

    fn selector(&self, component: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app.kubernetes.io/instance".to_string(), self.name.clone()),
            ("app.kubernetes.io/component".to_string(), component.to_string()),
        ])
    }

    fn meta(&self, name: String, component: &str) -> ObjectMeta {
        let mut labels = self.jaeger.spec.labels.clone();
        labels.insert("app".to_string(), "jaeger".to_string());
        labels.insert("app.kubernetes.io/name".to_string(), name.clone());
        labels.insert("app.kubernetes.io/part-of".to_string(), "jaeger".to_string());
        labels.insert("app.kubernetes.io/component".to_string(), component.to_string());
        let annotations = self.jaeger.spec.annotations.clone();
        ObjectMeta {
            name: Some(name),
            namespace: self.namespace.clone(),
            labels: Some(labels),
            annotations: Some(annotations).filter(|a| !a.is_empty()),
            ..ObjectMeta::default()
        }
    }

    fn sampling_name(&self) -> String {
        format!("{}-sampling-configuration", self.name)
    }

    fn account(&self) -> ServiceAccount {
        ServiceAccount {
            metadata: self.meta(self.name.clone(), "service-account"),
            ..ServiceAccount::default()
        }
    }

    fn sampling(&self) -> Result<ConfigMap> {
        let body = match &self.jaeger.spec.sampling.options {
            Some(options) => serde_json::to_string(options)?,
            None => DEFAULT_SAMPLING.to_string(),
        };
        Ok(ConfigMap {
            metadata: self.meta(self.sampling_name(), "sampling-configuration"),
            data: Some(BTreeMap::from([("sampling".to_string(), body)])),
            ..ConfigMap::default()
        })
    }

    fn args(&self, options: &BTreeMap<String, String>, sampling: bool) -> Vec<String> {
        let mut args: Vec<String> = self
            .jaeger
            .spec
            .storage
            .options
            .iter()
            .chain(options.iter())
            .map(|(k, v)| format!("--{k}={v}"))
            .collect();
        if sampling {
            args.push(format!("--sampling.strategies-file={SAMPLING_MOUNT}/sampling.json"));
        }
        args
    }

    #[allow(clippy::too_many_arguments)]
    fn deployment(
        &self,
        name: String,
        component: &str,
        image: String,
        replicas: Option<i32>,
        args: Vec<String>,
        ports: Vec<ContainerPort>,
        sampling: bool,
    ) -> Result<Deployment> {
        let labels = self.selector(component);
        let (volumes, mounts) = if sampling {
            let volume: Volume = serde_json::from_value(serde_json::json!({
                "name": "sampling",
                "configMap": {
                    "name": self.sampling_name(),
                    "items": [{"key": "sampling", "path": "sampling.json"}],
                },
            }))?;
            (
                Some(vec![volume]),
                Some(vec![VolumeMount {
                    name: "sampling".to_string(),
                    mount_path: SAMPLING_MOUNT.to_string(),
                    read_only: Some(true),
                    ..VolumeMount::default()
                }]),
            )
        } else {
            (None, None)
        };
        Ok(Deployment {
            metadata: self.meta(name, component),
            spec: Some(DeploymentSpec {
                replicas,
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..LabelSelector::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(PodSpec {
                        service_account_name: Some(self.name.clone()),
                        containers: vec![Container {
                            name: format!("jaeger-{component}"),
                            image: Some(image),
                            args: Some(args),
                            env: Some(vec![EnvVar {
                                name: "SPAN_STORAGE_TYPE".to_string(),
                                value: Some(self.jaeger.spec.storage.storage_type.as_str().to_string()),
                                ..EnvVar::default()
                            }]),
                            ports: Some(ports),
                            volume_mounts: mounts,
                            ..Container::default()
                        }],
                        volumes,
                        ..PodSpec::default()
                    }),
                },
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        })
    }

    fn service(&self, name: String, component: &str, ports: Vec<ServicePort>, headless: bool) -> Service {
        Service {
            metadata: self.meta(name, component),
            spec: Some(ServiceSpec {
                selector: Some(self.selector(component)),
                cluster_ip: headless.then(|| "None".to_string()),
                ports: Some(ports),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        }
    }

    fn ingress(&self) -> Option<Ingress> {
        if self.jaeger.spec.ingress.enabled == Some(false) {
            return None;
        }
        let mut metadata = self.meta(self.name.clone(), "query-ingress");
        if !self.jaeger.spec.ingress.annotations.is_empty() {
            metadata
                .annotations
                .get_or_insert_with(Default::default)
                .extend(self.jaeger.spec.ingress.annotations.clone());
        }
        Some(Ingress {
            metadata,
            spec: Some(NetIngressSpec {
                default_backend: Some(IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: format!("{}-query", self.name),
                        port: Some(ServiceBackendPort {
                            number: Some(QUERY_PORT),
                            ..ServiceBackendPort::default()
                        }),
                    }),
                    resource: None,
                }),
                ..NetIngressSpec::default()
            }),
            ..Ingress::default()
        })
    }

    fn collector_ports() -> Vec<ContainerPort> {
        COLLECTOR_PORTS
            .iter()
            .map(|(name, port)| container_port(name, *port, "TCP"))
            .collect()
    }

    fn collector_service(&self, component: &str) -> Service {
        let ports = COLLECTOR_PORTS
            .iter()
            .map(|(name, port)| service_port(name, *port, "TCP"))
            .collect();
        self.service(format!("{}-collector", self.name), component, ports, false)
    }

    fn query_service(&self, component: &str) -> Service {
        let ports = vec![service_port("http-query", QUERY_PORT, "TCP")];
        self.service(format!("{}-query", self.name), component, ports, false)
    }

    fn all_in_one(&self) -> Result<DesiredBundle> {
        let spec = &self.jaeger.spec.all_in_one;
        let image = spec
            .image
            .clone()
            .unwrap_or_else(|| format!("jaegertracing/all-in-one:{JAEGER_VERSION}"));
        let mut ports = Self::collector_ports();
        ports.push(container_port("query", QUERY_PORT, "TCP"));
        ports.extend(
            AGENT_PORTS
                .iter()
                .map(|(name, port, proto)| container_port(name, *port, proto)),
        );
        let args = self.args(&spec.options, true);
        let deployment = self.deployment(self.name.clone(), "all-in-one", image, Some(1), args, ports, true)?;
        let agent_ports = AGENT_PORTS
            .iter()
            .map(|(name, port, proto)| service_port(name, *port, proto))
            .collect();
        let services = [
            self.collector_service("all-in-one"),
            self.query_service("all-in-one"),
            self.service(format!("{}-agent", self.name), "all-in-one", agent_ports, true),
        ];
        DesiredBundle::new()
            .with_accounts(&[self.account()])?
            .with_config_maps(&[self.sampling()?])?
            .with_deployments(&[deployment])?
            .with_services(&services)?
            .with_ingresses(self.ingress().as_slice())
    }

    fn production(&self) -> Result<DesiredBundle> {
        let collector = &self.jaeger.spec.collector;
        let query = &self.jaeger.spec.query;
        let collector_deploy = self.deployment(
            format!("{}-collector", self.name),
            "collector",
            collector
                .image
                .clone()
                .unwrap_or_else(|| format!("jaegertracing/jaeger-collector:{JAEGER_VERSION}")),
            collector.replicas.or(Some(1)),
            self.args(&collector.options, true),
            Self::collector_ports(),
            true,
        )?;
        let query_deploy = self.deployment(
            format!("{}-query", self.name),
            "query",
            query
                .image
                .clone()
                .unwrap_or_else(|| format!("jaegertracing/jaeger-query:{JAEGER_VERSION}")),
            query.replicas.or(Some(1)),
            self.args(&query.options, false),
            vec![container_port("query", QUERY_PORT, "TCP")],
            false,
        )?;
        DesiredBundle::new()
            .with_accounts(&[self.account()])?
            .with_config_maps(&[self.sampling()?])?
            .with_deployments(&[collector_deploy, query_deploy])?
            .with_services(&[self.collector_service("collector"), self.query_service("query")])?
            .with_ingresses(self.ingress().as_slice())
    }
}

fn container_port(name: &str, port: i32, protocol: &str) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some(protocol.to_string()),
        ..ContainerPort::default()
    }
}

fn service_port(name: &str, port: i32, protocol: &str) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some(protocol.to_string()),
        ..ServicePort::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{identity::Kind, jaeger::StorageType};

    fn names(bundle: &DesiredBundle, kind: Kind) -> Vec<String> {
        bundle
            .objects(kind)
            .iter()
            .map(|o| o.identity().name)
            .collect()
    }

    #[test]
    fn test_all_in_one_objects() {
        let jaeger = Jaeger::named("observability", "simplest");
        let bundle = DefaultStrategy.compute_desired(&jaeger).unwrap();
        assert_eq!(names(&bundle, Kind::ServiceAccount), vec!["simplest"]);
        assert_eq!(names(&bundle, Kind::ConfigMap), vec!["simplest-sampling-configuration"]);
        assert_eq!(names(&bundle, Kind::Deployment), vec!["simplest"]);
        assert_eq!(
            names(&bundle, Kind::Service),
            vec!["simplest-collector", "simplest-query", "simplest-agent"]
        );
        assert_eq!(names(&bundle, Kind::Ingress), vec!["simplest"]);
        assert!(bundle
            .objects(Kind::Deployment)
            .iter()
            .all(|o| o.identity().namespace == "observability"));
    }

    #[test]
    fn test_options_become_sorted_args() {
        let mut jaeger = Jaeger::named("observability", "simplest");
        jaeger.spec.all_in_one.options.insert("memory.max-traces".to_string(), "100000".to_string());
        jaeger.spec.all_in_one.options.insert("log-level".to_string(), "debug".to_string());
        let bundle = DefaultStrategy.compute_desired(&jaeger).unwrap();
        let deploy = &bundle.objects(Kind::Deployment)[0].object;
        let args = &deploy.data["spec"]["template"]["spec"]["containers"][0]["args"];
        assert_eq!(args[0], "--log-level=debug");
        assert_eq!(args[1], "--memory.max-traces=100000");
        assert_eq!(args[2], "--sampling.strategies-file=/etc/jaeger/sampling/sampling.json");
    }

    #[test]
    fn test_ingress_can_be_disabled() {
        let mut jaeger = Jaeger::named("observability", "simplest");
        jaeger.spec.ingress.enabled = Some(false);
        let bundle = DefaultStrategy.compute_desired(&jaeger).unwrap();
        assert!(bundle.objects(Kind::Ingress).is_empty());
    }

    #[test]
    fn test_production_requires_persistent_storage() {
        let mut jaeger = Jaeger::named("observability", "prod");
        jaeger.spec.strategy = DeploymentStrategy::Production;
        assert!(matches!(DefaultStrategy.compute_desired(&jaeger), Err(Error::Strategy(_))));

        jaeger.spec.storage.storage_type = StorageType::Elasticsearch;
        let bundle = DefaultStrategy.compute_desired(&jaeger).unwrap();
        assert_eq!(names(&bundle, Kind::Deployment), vec!["prod-collector", "prod-query"]);
        assert_eq!(names(&bundle, Kind::Service), vec!["prod-collector", "prod-query"]);
    }

    #[test]
    fn test_streaming_is_refused() {
        let mut jaeger = Jaeger::named("observability", "stream");
        jaeger.spec.strategy = DeploymentStrategy::Streaming;
        assert!(DefaultStrategy.compute_desired(&jaeger).is_err());
    }

    #[test]
    fn test_instance_labels_are_propagated() {
        let mut jaeger = Jaeger::named("observability", "simplest");
        jaeger.spec.labels.insert("team".to_string(), "tracing".to_string());
        let bundle = DefaultStrategy.compute_desired(&jaeger).unwrap();
        for obj in bundle.objects(Kind::Service) {
            assert_eq!(obj.object.metadata.labels.as_ref().unwrap()["team"], "tracing");
        }
    }
}
