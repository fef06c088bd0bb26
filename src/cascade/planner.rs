use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;
use tracing::warn;

use super::DeleteStrategy;
use crate::entity::CollectionShape;
use crate::entity::ColumnLocation;
use crate::entity::EntityType;
use crate::entity::Field;
use crate::entity::FieldKind;
use crate::listener::Notification;
use crate::listener::Operation;
use crate::store::Filter;
use crate::store::RelationalStore;
use crate::store::Row;
use crate::store::Select;
use crate::store::Statement;
use crate::Result;

/// Everything one root deletion turns into.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CascadePlan {
    /// Executed in order, in one transaction
    pub statements: Vec<Statement>,
    /// The changes the statements will cause, with complete old images
    pub notifications: Vec<Notification>,
    /// Wire keys of cache-backed values to remove
    pub cache_deletes: Vec<String>,
}

impl CascadePlan {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.cache_deletes.is_empty()
    }

    fn push(
        &mut self,
        statement: Statement,
        notifications: impl IntoIterator<Item = Notification>,
    ) {
        if self.statements.contains(&statement) {
            return;
        }
        self.statements.push(statement);
        self.notifications.extend(notifications);
    }
}

/// Walks delete strategies outward from one root.
///
/// Dependents are visited breadth first with a visited set, so cyclic
/// relation graphs terminate. Link rows (foreign values, join rows, unlinked
/// children) are removed first; root rows are deleted last, deepest first,
/// so no row is deleted while a row discovered through it still references
/// it.
pub struct CascadePlanner<'a> {
    types: &'a HashMap<String, Arc<EntityType>>,
    db: &'a dyn RelationalStore,
    origin: &'a str,
    namespace: &'a str,
}

struct Visit {
    ty: Arc<EntityType>,
    id: String,
    row: Option<Row>,
}

impl<'a> CascadePlanner<'a> {
    pub fn new(
        types: &'a HashMap<String, Arc<EntityType>>,
        db: &'a dyn RelationalStore,
        origin: &'a str,
        namespace: &'a str,
    ) -> Self {
        Self {
            types,
            db,
            origin,
            namespace,
        }
    }

    /// Plans the deletion of `id`. With `include_root` unset the root row is
    /// assumed gone already and only its dependents are planned.
    pub async fn plan_delete(
        &self,
        ty: &Arc<EntityType>,
        id: &str,
        include_root: bool,
    ) -> Result<CascadePlan> {
        let mut plan = CascadePlan::default();
        let mut visited: HashSet<(String, String)> = HashSet::new();
        let mut roots: Vec<(Arc<EntityType>, String, Row)> = Vec::new();
        let mut queue = VecDeque::from([Visit {
            ty: ty.clone(),
            id: id.to_string(),
            row: None,
        }]);
        let mut origin_visit = true;

        while let Some(Visit { ty, id, row }) = queue.pop_front() {
            if !visited.insert((ty.name().to_string(), id.clone())) {
                continue;
            }
            let is_origin = std::mem::take(&mut origin_visit);

            let row = match row {
                Some(row) => Some(row),
                None if is_origin && !include_root => None,
                None => self.select_root(&ty, &id).await?,
            };
            if row.is_none() && !is_origin {
                trace!(entity = ty.name(), id = %id, "dependent already gone");
                continue;
            }

            for field in ty.fields() {
                self.plan_field(&ty, &id, field, &mut plan, &mut queue).await?;
            }

            if include_root || !is_origin {
                let row = row
                    .unwrap_or_else(|| Row::from([(ty.id_column().to_string(), Some(id.clone()))]));
                roots.push((ty, id, row));
            }
        }

        for (ty, id, row) in roots.into_iter().rev() {
            let statement = Statement::Delete {
                table: ty.table().clone(),
                filter: Filter::eq(ty.id_column(), id),
            };
            let notification = self.notification(&statement, Operation::Delete, row, Row::new());
            plan.push(statement, [notification]);
        }
        Ok(plan)
    }

    async fn plan_field(
        &self,
        ty: &EntityType,
        id: &str,
        field: &Field,
        plan: &mut CascadePlan,
        queue: &mut VecDeque<Visit>,
    ) -> Result<()> {
        let strategy = field.delete_policy();
        match field.kind() {
            FieldKind::ScalarColumn {
                location: ColumnLocation::Foreign { table, link },
                ..
            } if strategy == DeleteStrategy::Cascade => {
                let filter = Filter::eq(&link.foreign_column, id);
                let rows = self.db.select(&Select::by(table, filter.clone())).await?;
                if rows.is_empty() {
                    return Ok(());
                }
                let statement = Statement::Delete {
                    table: table.clone(),
                    filter,
                };
                let notifications: Vec<_> = rows
                    .into_iter()
                    .map(|row| self.notification(&statement, Operation::Delete, row, Row::new()))
                    .collect();
                plan.push(statement, notifications);
            }
            FieldKind::ScalarCache { .. } => {
                plan.cache_deletes
                    .push(ty.cache_key(field, id).to_wire(self.namespace));
            }
            FieldKind::CollectionRelation {
                target,
                shape: CollectionShape::OneToMany { linking_column },
            } if strategy != DeleteStrategy::NoAction => {
                let Some(target) = self.types.get(target) else {
                    warn!(field = field.name(), target = %target, "collection target not registered, not cascading");
                    return Ok(());
                };
                let filter = Filter::eq(linking_column, id);
                let rows = self.db.select(&Select::by(target.table(), filter.clone())).await?;

                if strategy == DeleteStrategy::Cascade {
                    for row in rows {
                        if let Some(Some(child)) = row.get(target.id_column()).cloned() {
                            queue.push_back(Visit {
                                ty: target.clone(),
                                id: child,
                                row: Some(row),
                            });
                        }
                    }
                } else if !rows.is_empty() {
                    let statement = Statement::Update {
                        table: target.table().clone(),
                        assignments: vec![(linking_column.clone(), None)],
                        filter,
                    };
                    let notifications: Vec<_> = rows
                        .into_iter()
                        .map(|old| {
                            let mut new = old.clone();
                            new.insert(linking_column.clone(), None);
                            self.notification(&statement, Operation::Update, old, new)
                        })
                        .collect();
                    plan.push(statement, notifications);
                }
            }
            FieldKind::CollectionRelation {
                target,
                shape:
                    CollectionShape::ManyToMany {
                        join_table,
                        linking_column,
                        data_column,
                    },
            } if strategy != DeleteStrategy::NoAction => {
                let filter = Filter::eq(linking_column, id);
                let rows = self.db.select(&Select::by(join_table, filter.clone())).await?;
                if rows.is_empty() {
                    return Ok(());
                }

                if strategy == DeleteStrategy::Cascade {
                    match self.types.get(target) {
                        Some(target) => {
                            for row in &rows {
                                if let Some(Some(member)) = row.get(data_column).cloned() {
                                    queue.push_back(Visit {
                                        ty: target.clone(),
                                        id: member,
                                        row: None,
                                    });
                                }
                            }
                        }
                        None => {
                            warn!(field = field.name(), target = %target, "collection target not registered, unlinking only")
                        }
                    }
                }

                let statement = Statement::Delete {
                    table: join_table.clone(),
                    filter,
                };
                let notifications: Vec<_> = rows
                    .into_iter()
                    .map(|row| self.notification(&statement, Operation::Delete, row, Row::new()))
                    .collect();
                plan.push(statement, notifications);
            }
            _ => {}
        }
        Ok(())
    }

    async fn select_root(
        &self,
        ty: &EntityType,
        id: &str,
    ) -> Result<Option<Row>> {
        let rows = self
            .db
            .select(&Select::by(ty.table(), Filter::eq(ty.id_column(), id)))
            .await?;
        Ok(rows.into_iter().next())
    }

    fn notification(
        &self,
        statement: &Statement,
        operation: Operation,
        old: Row,
        new: Row,
    ) -> Notification {
        Notification::new(statement.table().clone(), operation, self.origin, old, new)
    }
}
