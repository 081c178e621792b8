use crate::Resolver;
use mesh_policy_controller_core::{
    mesh_config::MeshConfig, outbound::ClusterConfig, ClusterRef, NotReady, Readiness,
    ServiceIdentity,
};

impl Resolver {
    /// Resolves the endpoints and settings of outbound clusters.
    ///
    /// Fails with [`NotReady`] if the endpoints of any cluster's service
    /// have not been observed yet; a partial set is never returned.
    pub fn outbound_clusters(
        &self,
        mesh: &MeshConfig,
        id: &ServiceIdentity,
        clusters: &[ClusterRef],
    ) -> Readiness<Vec<ClusterConfig>> {
        clusters
            .iter()
            .map(|cluster| {
                let endpoints = self
                    .directory
                    .endpoints(&cluster.service)
                    .ok_or_else(|| {
                        NotReady::new(format!("endpoints of {} not observed", cluster.service))
                    })?
                    .into_iter()
                    .filter(|ep| ep.port == cluster.target_port)
                    .collect();
                let connection_settings = self
                    .directory
                    .upstream_traffic_setting(&cluster.service)
                    .and_then(|s| s.connection_settings);
                Ok(ClusterConfig {
                    name: cluster.name(),
                    endpoints,
                    connection_settings,
                    retry_policy: self.directory.retry_policy(id, &cluster.service),
                    active_health_checks: mesh.feature_flags.enable_sidecar_active_health_checks,
                })
            })
            .collect()
    }
}
