use crate::{ClusterInfo, Resolver};
use mesh_policy_controller_core::{
    memory::{MemoryDirectory, ResourceDocument},
    mesh_config::MeshConfig,
    ResourceDirectory,
};
use std::sync::Arc;

pub(crate) fn resolver(resources: serde_json::Value) -> (Arc<MemoryDirectory>, Resolver) {
    let doc = ResourceDocument::from_json(resources.to_string().as_bytes())
        .expect("resources must parse");
    let dir = Arc::new(MemoryDirectory::from_document(doc));
    let resolver = Resolver::new(
        dir.clone(),
        Arc::new(ClusterInfo {
            cluster_domain: "cluster.local".to_string(),
            trust_domain: "cluster.local".to_string(),
        }),
    );
    (dir, resolver)
}

pub(crate) fn mesh(dir: &MemoryDirectory) -> Arc<MeshConfig> {
    dir.mesh_config()
}
