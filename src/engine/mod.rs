mod distance_api;
mod ride_api;

use std::sync::Arc;

use crate::{
    config::Config,
    db::{DynStore, PgStore},
    distance::{
        local_estimate, route_endpoints, routing_estimate, DynRouter, Strategy,
    },
    entities::{Coordinates, Ride, RidePoint},
    error::{configuration_error, Error},
    external::google_maps::GoogleMaps,
};

/// Ride lifecycle and distance computation over an injected store and,
/// optionally, a routing service.
pub struct Engine {
    store: DynStore,
    router: Option<DynRouter>,
    strategy: Strategy,
}

impl Engine {
    pub fn new(store: DynStore, strategy: Strategy) -> Self {
        Self {
            store,
            router: None,
            strategy,
        }
    }

    pub fn with_router(mut self, router: DynRouter) -> Self {
        self.router = Some(router);
        self
    }

    /// Connects to Postgres and wires the routing client when the configured
    /// strategy needs it.
    #[tracing::instrument(name = "Engine::from_config", skip_all)]
    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        let store = PgStore::new(&config.database_url, config.max_connections).await?;
        let engine = Self::new(Arc::new(store), config.strategy);

        let engine = match &config.google_maps {
            Some(maps) => engine.with_router(Arc::new(GoogleMaps::new(
                maps.api_base.clone(),
                maps.api_key.clone(),
                maps.timeout,
            )?)),
            None => engine,
        };

        tracing::info!(strategy = %engine.strategy, "engine ready");

        Ok(engine)
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Runs exactly one estimator over an already fetched point sequence.
    async fn estimate(
        &self,
        strategy: Strategy,
        ride: &Ride,
        points: &[RidePoint],
        end: Option<Coordinates>,
    ) -> Result<f64, Error> {
        match strategy {
            Strategy::Local => local_estimate(points),
            Strategy::RoutingService => {
                let router = self
                    .router
                    .as_deref()
                    .ok_or_else(|| configuration_error("no routing service configured"))?;
                let (origin, destination) = route_endpoints(ride, points, end)?;

                routing_estimate(router, origin, destination).await
            }
        }
    }
}

#[test]
fn engine_serves_api_test() {
    fn assert_api<T: crate::api::API>(_: &T) {}

    let (engine, _) = memory_engine(Strategy::Local);
    assert_api(&engine);
    assert_eq!(engine.strategy(), Strategy::Local);
}

#[cfg(test)]
pub(crate) fn memory_engine(strategy: Strategy) -> (Engine, Arc<crate::db::MemoryStore>) {
    let store = Arc::new(crate::db::MemoryStore::new());
    let engine = Engine::new(store.clone(), strategy);

    (engine, store)
}
