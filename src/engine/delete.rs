use std::sync::Arc;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::EngineInner;
use crate::cascade::CascadePlan;
use crate::cascade::CascadePlanner;
use crate::entity::Entity;
use crate::entity::EntityType;
use crate::write_path::RowRoute;
use crate::write_path::WriteMode;
use crate::write_path::WriteOp;
use crate::write_path::WriteTicket;
use crate::Result;

impl EngineInner {
    fn planner<'a>(
        &'a self,
        types: &'a super::TypeMap,
    ) -> CascadePlanner<'a> {
        CascadePlanner::new(
            types,
            self.db.as_ref(),
            &self.origin,
            &self.config.listener.keyspace_prefix,
        )
    }

    /// Deletes a root entity together with whatever its fields' delete
    /// strategies reach.
    pub(crate) async fn delete(
        self: &Arc<Self>,
        entity: &Entity,
        mode: WriteMode,
    ) -> Result<()> {
        let ty = entity.entity_type();
        let types = self.types();
        let plan = self.planner(&types).plan_delete(ty, entity.id(), true).await?;
        debug!(
            entity = %entity,
            statements = plan.statements.len(),
            cache_keys = plan.cache_deletes.len(),
            "deleting entity"
        );

        for field in ty.fields() {
            if let Some(key) = ty.cell_key(field, entity.id()) {
                self.coalescer.cancel(&key);
            }
        }

        let tickets = self.apply_plan(&entity.route(), plan)?;
        if mode == WriteMode::Sync {
            for ticket in tickets {
                ticket.wait().await?;
            }
        }
        Ok(())
    }

    /// Applies the plan's notifications locally, then queues its writes on
    /// one route so they run in plan order.
    fn apply_plan(
        self: &Arc<Self>,
        route: &RowRoute,
        plan: CascadePlan,
    ) -> Result<Vec<WriteTicket>> {
        for notification in &plan.notifications {
            self.dispatch(notification);
        }

        let mut tickets = Vec::with_capacity(plan.cache_deletes.len() + 1);
        if !plan.statements.is_empty() {
            tickets.push(self.queue.submit(route, plan.statements)?);
        }
        for key in plan.cache_deletes {
            tickets.push(self.queue.submit(route, WriteOp::CacheDelete { key })?);
        }
        Ok(tickets)
    }

    /// Cascades a delete some other writer made directly in the database.
    /// Every engine that sees the change runs the same idempotent
    /// statements.
    pub(crate) fn spawn_external_cascade(
        self: &Arc<Self>,
        ty: Arc<EntityType>,
        id: String,
    ) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(entity = ty.name(), id = %id, "no runtime to cascade external delete on");
            return;
        };
        let engine = self.clone();
        runtime.spawn(async move {
            let types = engine.types();
            let plan = match engine.planner(&types).plan_delete(&ty, &id, false).await {
                Ok(plan) => plan,
                Err(e) => {
                    warn!(entity = ty.name(), id = %id, error = %e, "planning external delete cascade failed");
                    return;
                }
            };
            if plan.is_empty() {
                return;
            }
            info!(
                entity = ty.name(),
                id = %id,
                statements = plan.statements.len(),
                "cascading external delete"
            );
            if let Err(e) = engine.apply_plan(&RowRoute::new(ty.table(), &id), plan) {
                warn!(entity = ty.name(), id = %id, error = %e, "external delete cascade not queued");
            }
        });
    }
}
