use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::BrokerType;

/// Magic numbers per worker. Each worker tags its orders from its own block
/// so in-flight orders from a recycled instance can never collide with the
/// replacement's.
const MAGIC_SPAN: i64 = 50;

/// A worker's slice of the shared resource pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortAndMagic {
    pub port: u16,
    pub magic_start: i64,
    pub magic_span: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    /// The band for this broker type is full. Surfaced to operators; never
    /// silently served from another band — band identity carries broker
    /// meaning.
    #[error("allocation pool exhausted for broker band '{0}'")]
    Exhausted(BrokerType),

    #[error("no allocation recorded for worker {0}")]
    UnknownWorker(Uuid),
}

/// Pool utilization for one broker band, for the operational surface.
#[derive(Debug, Clone, Serialize)]
pub struct BandUtilization {
    pub broker_type: BrokerType,
    pub capacity: usize,
    pub in_use: usize,
}

struct Band {
    ports: RangeInclusive<u16>,
    magic_base: i64,
    free_ports: BTreeSet<u16>,
}

impl Band {
    fn new(ports: RangeInclusive<u16>, magic_base: i64) -> Self {
        let free_ports = ports.clone().collect();
        Self {
            ports,
            magic_base,
            free_ports,
        }
    }

    fn magic_for(&self, port: u16) -> i64 {
        self.magic_base + (port - *self.ports.start()) as i64 * MAGIC_SPAN
    }
}

struct RegistryInner {
    bands: HashMap<BrokerType, Band>,
    by_worker: HashMap<Uuid, (BrokerType, PortAndMagic)>,
}

/// Owns the free lists of terminal ports and magic-number blocks.
///
/// The only truly shared mutable state in the core: every mutation is a
/// single atomic allocate-or-release under one lock, never a read-modify-
/// write across two calls. Two concurrent `allocate` calls can never
/// return overlapping resources.
#[derive(Clone)]
pub struct AllocationRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl AllocationRegistry {
    /// Standard band layout: ports 9001–9600 split into three broker bands,
    /// magic blocks partitioned the same way.
    pub fn new() -> Self {
        let mut bands = HashMap::new();
        bands.insert(BrokerType::Demo, Band::new(9001..=9200, 310_000));
        bands.insert(BrokerType::Live, Band::new(9201..=9400, 320_000));
        bands.insert(BrokerType::Prop, Band::new(9401..=9600, 330_000));

        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                bands,
                by_worker: HashMap::new(),
            })),
        }
    }

    /// Atomically claim a port and magic block for `worker_id` from the
    /// band matching `broker_type`.
    pub async fn allocate(
        &self,
        worker_id: Uuid,
        broker_type: BrokerType,
    ) -> Result<PortAndMagic, AllocationError> {
        let mut inner = self.inner.lock().await;
        let band = inner
            .bands
            .get_mut(&broker_type)
            .ok_or(AllocationError::Exhausted(broker_type))?;

        let port = band
            .free_ports
            .pop_first()
            .ok_or(AllocationError::Exhausted(broker_type))?;

        let grant = PortAndMagic {
            port,
            magic_start: band.magic_for(port),
            magic_span: MAGIC_SPAN,
        };
        inner.by_worker.insert(worker_id, (broker_type, grant));

        tracing::debug!(
            worker_id = %worker_id,
            broker = %broker_type,
            port = grant.port,
            magic_start = grant.magic_start,
            "Allocation granted"
        );
        Ok(grant)
    }

    /// Return a worker's resources to its band. Idempotent: releasing an
    /// unknown worker is a no-op.
    pub async fn release(&self, worker_id: Uuid) {
        let mut inner = self.inner.lock().await;
        if let Some((broker_type, grant)) = inner.by_worker.remove(&worker_id) {
            if let Some(band) = inner.bands.get_mut(&broker_type) {
                band.free_ports.insert(grant.port);
            }
            tracing::debug!(
                worker_id = %worker_id,
                port = grant.port,
                "Allocation released"
            );
        }
    }

    pub async fn lookup(&self, worker_id: Uuid) -> Result<PortAndMagic, AllocationError> {
        let inner = self.inner.lock().await;
        inner
            .by_worker
            .get(&worker_id)
            .map(|(_, grant)| *grant)
            .ok_or(AllocationError::UnknownWorker(worker_id))
    }

    /// Re-claim a specific port for a worker, used when rebuilding the
    /// registry from persisted worker rows at startup.
    pub async fn restore(
        &self,
        worker_id: Uuid,
        broker_type: BrokerType,
        port: u16,
    ) -> Result<PortAndMagic, AllocationError> {
        let mut inner = self.inner.lock().await;
        let band = inner
            .bands
            .get_mut(&broker_type)
            .ok_or(AllocationError::Exhausted(broker_type))?;

        if !band.free_ports.remove(&port) {
            return Err(AllocationError::Exhausted(broker_type));
        }
        let grant = PortAndMagic {
            port,
            magic_start: band.magic_for(port),
            magic_span: MAGIC_SPAN,
        };
        inner.by_worker.insert(worker_id, (broker_type, grant));
        Ok(grant)
    }

    pub async fn utilization(&self) -> Vec<BandUtilization> {
        let inner = self.inner.lock().await;
        let mut out: Vec<BandUtilization> = inner
            .bands
            .iter()
            .map(|(broker_type, band)| {
                let capacity = band.ports.clone().count();
                BandUtilization {
                    broker_type: *broker_type,
                    capacity,
                    in_use: capacity - band.free_ports.len(),
                }
            })
            .collect();
        out.sort_by_key(|b| b.broker_type.to_string());
        out
    }
}

impl Default for AllocationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
