use async_trait::async_trait;
use stackflow_core::{
    DeployedTemplate, GatewayError, GatewayResult, Parameters, ProviderGateway, ResourceHandle,
    ResourceKind, ResourceRequest, ResourceSpec, ResourceStatus, Template,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A gateway call, recorded in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Find(String),
    Create(String),
    Update(String),
    Delete(String),
    ReadTemplate(String),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Call::Create(_) | Call::Update(_) | Call::Delete(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Call::Find(n) | Call::Create(n) | Call::Update(n) | Call::Delete(n) | Call::ReadTemplate(n) => n,
        }
    }
}

#[derive(Default)]
struct State {
    resources: BTreeMap<(ResourceKind, String), ResourceHandle>,
    deployed: HashMap<String, DeployedTemplate>,
    requested: HashMap<String, Parameters>,
    outputs: HashMap<String, Vec<(String, String)>>,
    calls: Vec<Call>,
    next_id: usize,
    reject_updates: Option<String>,
    failing_deletes: HashSet<String>,
    vanishing: HashSet<String>,
    cancel_after_create: Option<(String, CancellationToken)>,
}

/// In-memory gateway recording every call
///
/// Creates and updates complete immediately; a resource stored as pending
/// settles to ready on its next refresh.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<State>,
}

#[allow(dead_code)]
impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a resource as if it already existed
    pub fn insert(&self, handle: ResourceHandle) {
        let mut state = self.state.lock().unwrap();
        state
            .resources
            .insert((handle.kind(), handle.name().to_string()), handle);
    }

    /// Overrides the template a resource is deployed with
    pub fn set_deployed(&self, name: &str, body: &str, parameters: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        state.deployed.insert(
            name.to_string(),
            DeployedTemplate {
                body: body.as_bytes().to_vec(),
                parameters: parameters
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
    }

    /// Outputs a stack exposes once created
    pub fn set_outputs(&self, name: &str, outputs: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        state.outputs.insert(
            name.to_string(),
            outputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }

    pub fn reject_updates(&self, message: &str) {
        self.state.lock().unwrap().reject_updates = Some(message.to_string());
    }

    pub fn fail_delete(&self, name: &str) {
        self.state.lock().unwrap().failing_deletes.insert(name.to_string());
    }

    /// The next refresh of `name` finds it deleted
    pub fn vanish_on_refresh(&self, name: &str) {
        self.state.lock().unwrap().vanishing.insert(name.to_string());
    }

    pub fn cancel_after_create(&self, name: &str, token: CancellationToken) {
        self.state.lock().unwrap().cancel_after_create = Some((name.to_string(), token));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn calls_for(&self, name: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.name() == name).collect()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    /// Parameters of the last create or update for `name`
    pub fn parameters_of(&self, name: &str) -> Option<Parameters> {
        self.state.lock().unwrap().requested.get(name).cloned()
    }

    pub fn exists(&self, kind: ResourceKind, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .resources
            .contains_key(&(kind, name.to_string()))
    }

    fn prefix(kind: ResourceKind) -> &'static str {
        match kind {
            ResourceKind::Container => "c",
            ResourceKind::Stack => "stk",
            ResourceKind::Keypair => "kp",
            ResourceKind::Network => "net",
            ResourceKind::Volume => "vol",
            _ => "r",
        }
    }
}

#[async_trait]
impl ProviderGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn find(&self, kind: ResourceKind, name: &str) -> GatewayResult<Option<ResourceHandle>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Find(name.to_string()));
        Ok(state.resources.get(&(kind, name.to_string())).cloned())
    }

    async fn create(&self, request: &ResourceRequest<'_>) -> GatewayResult<ResourceHandle> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(request.name.to_string()));

        let key = (request.kind, request.name.to_string());
        if state.resources.contains_key(&key) {
            return Err(GatewayError::Conflict(request.name.to_string()));
        }

        state.next_id += 1;
        let id = format!("{}-{}", Self::prefix(request.kind), state.next_id);
        let outputs = state.outputs.get(request.name).cloned().unwrap_or_default();
        let handle = ResourceHandle::new(request.kind, request.name, id, ResourceStatus::Ready)
            .with_provider_status("CREATE_COMPLETE")
            .with_attribute("name", request.name)
            .with_outputs(outputs);

        if let Some(template) = request.template {
            state.deployed.insert(
                request.name.to_string(),
                DeployedTemplate {
                    body: template.body().to_vec(),
                    parameters: request.parameters.clone(),
                },
            );
        }
        state
            .requested
            .insert(request.name.to_string(), request.parameters.clone());
        state.resources.insert(key, handle.clone());

        if let Some((name, token)) = &state.cancel_after_create {
            if name == request.name {
                token.cancel();
            }
        }
        Ok(handle)
    }

    async fn update(&self, request: &ResourceRequest<'_>) -> GatewayResult<ResourceHandle> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Update(request.name.to_string()));

        if let Some(message) = &state.reject_updates {
            return Err(GatewayError::Validation(message.clone()));
        }

        let key = (request.kind, request.name.to_string());
        let handle = state
            .resources
            .get(&key)
            .ok_or_else(|| GatewayError::NotFound(request.name.to_string()))?
            .superseded(ResourceStatus::Ready, "UPDATE_COMPLETE");

        if let Some(template) = request.template {
            state.deployed.insert(
                request.name.to_string(),
                DeployedTemplate {
                    body: template.body().to_vec(),
                    parameters: request.parameters.clone(),
                },
            );
        }
        state
            .requested
            .insert(request.name.to_string(), request.parameters.clone());
        state.resources.insert(key, handle.clone());
        Ok(handle)
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete(name.to_string()));

        if state.failing_deletes.contains(name) {
            return Err(GatewayError::Transient(format!("{} is still in use", name)));
        }
        state.resources.remove(&(kind, name.to_string()));
        state.deployed.remove(name);
        Ok(())
    }

    async fn refresh(&self, handle: &ResourceHandle) -> GatewayResult<Option<ResourceHandle>> {
        let mut state = self.state.lock().unwrap();
        let key = (handle.kind(), handle.name().to_string());
        let Some(current) = state.resources.get(&key).cloned() else {
            return Ok(None);
        };
        if state.vanishing.remove(handle.name()) {
            state.resources.remove(&key);
            return Ok(Some(current.superseded(ResourceStatus::Deleted, "DELETE_COMPLETE")));
        }
        if current.status() == ResourceStatus::Pending {
            let settled = current.superseded(ResourceStatus::Ready, "CREATE_COMPLETE");
            state.resources.insert(key, settled.clone());
            return Ok(Some(settled));
        }
        Ok(Some(current))
    }

    async fn current_template(&self, handle: &ResourceHandle) -> GatewayResult<DeployedTemplate> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ReadTemplate(handle.name().to_string()));
        state
            .deployed
            .get(handle.name())
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(handle.name().to_string()))
    }
}

#[allow(dead_code)]
pub const STORAGE_TEMPLATE: &str = "\
heat_template_version: 2016-10-14
resources:
  seed_git_backups:
    type: OS::Swift::Container
    properties:
      name: seed-git-backups
";

#[allow(dead_code)]
pub fn stack(name: &str) -> ResourceSpec {
    ResourceSpec::stack(
        name,
        Template::from_bytes(format!("stacks/{}.yaml", name), STORAGE_TEMPLATE),
    )
}
