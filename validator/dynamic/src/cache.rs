use crate::{cancellable, Result};
use admission_validator_core::{
    clients::VirtualNetworks,
    network::{VirtualNetwork, VirtualNetworkSubnet},
    resource_id::split_subnet_id,
    ResourceId,
};
use ahash::AHashMap as HashMap;
use std::collections::hash_map::Entry;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Virtual networks fetched during one validation call.
///
/// Owned by the call that creates it; several subnets usually share a
/// network and are served from the first fetch.
pub(crate) struct VirtualNetworkCache<'a> {
    client: &'a dyn VirtualNetworks,
    networks: HashMap<Key, VirtualNetwork>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Key {
    resource_group: String,
    name: String,
    expand: Option<String>,
}

// === impl VirtualNetworkCache ===

impl<'a> VirtualNetworkCache<'a> {
    pub(crate) fn new(client: &'a dyn VirtualNetworks) -> Self {
        Self {
            client,
            networks: HashMap::new(),
        }
    }

    pub(crate) async fn get(
        &mut self,
        cancel: &CancellationToken,
        vnet: &ResourceId,
        expand: Option<&str>,
    ) -> Result<&VirtualNetwork> {
        let key = Key {
            resource_group: vnet.resource_group().to_lowercase(),
            name: vnet.name().to_lowercase(),
            expand: expand.map(str::to_string),
        };

        match self.networks.entry(key) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                debug!(%vnet, "Fetching virtual network");
                let network = cancellable(
                    cancel,
                    self.client
                        .get(vnet.resource_group(), vnet.name(), expand),
                )
                .await??;
                Ok(e.insert(network))
            }
        }
    }

    /// Looks a subnet up in its parent network.
    pub(crate) async fn subnet(
        &mut self,
        cancel: &CancellationToken,
        subnet_id: &str,
    ) -> Result<Option<&VirtualNetworkSubnet>> {
        let (vnet_id, _) = split_subnet_id(subnet_id)?;
        let vnet = vnet_id.parse::<ResourceId>()?;
        let network = self.get(cancel, &vnet, None).await?;
        Ok(network.subnet(subnet_id))
    }
}
