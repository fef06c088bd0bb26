use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::key::TableRef;
use crate::listener::Notification;
use crate::listener::Operation;
use crate::store::Filter;
use crate::store::OnConflict;
use crate::store::RelationalStore;
use crate::store::Row;
use crate::store::Select;
use crate::store::Statement;
use crate::Result;
use crate::StoreError;

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<String>,
    /// Unique keys; the first one is the primary key
    unique: Vec<Vec<String>>,
    rows: Vec<Row>,
}

#[derive(Debug, Default, Clone)]
struct State {
    tables: HashMap<TableRef, Table>,
    triggered: HashSet<TableRef>,
}

/// In-memory relational store.
///
/// Tables are created up front with [`create_table`](Self::create_table).
/// Once trigger DDL has been applied to a table, every committed row change
/// is published to all subscribers as a change payload carrying the origin
/// passed to [`apply`](RelationalStore::apply), exactly as the generated
/// trigger would.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<String>>>,
    ddl: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table. `unique` lists unique keys, primary key first.
    pub fn create_table(
        &self,
        table: TableRef,
        columns: &[&str],
        unique: &[&[&str]],
    ) {
        self.state.lock().tables.insert(
            table,
            Table {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                unique: unique
                    .iter()
                    .map(|key| key.iter().map(|c| c.to_string()).collect())
                    .collect(),
                rows: Vec::new(),
            },
        );
    }

    pub fn rows(
        &self,
        table: &TableRef,
    ) -> Vec<Row> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row(
        &self,
        table: &TableRef,
        filter: &Filter,
    ) -> Option<Row> {
        self.rows(table)
            .into_iter()
            .find(|row| filter.matches(|c| row.get(c)))
    }

    pub fn has_trigger(
        &self,
        table: &TableRef,
    ) -> bool {
        self.state.lock().triggered.contains(table)
    }

    pub fn ddl_log(&self) -> Vec<String> {
        self.ddl.lock().clone()
    }

    /// Makes the next `apply` fail with `message`, leaving the data as is.
    pub fn fail_next_apply(
        &self,
        message: &str,
    ) {
        self.failures.lock().push(message.to_string());
    }

    /// Ends every subscription, as a dropped connection would.
    pub fn disconnect_subscribers(&self) {
        self.subscribers.lock().clear();
    }

    /// Runs statements as an external writer that sets no origin.
    pub fn apply_external(
        &self,
        statements: Vec<Statement>,
    ) -> Result<Vec<u64>> {
        self.commit("", statements)
    }

    fn commit(
        &self,
        origin: &str,
        statements: Vec<Statement>,
    ) -> Result<Vec<u64>> {
        if let Some(message) = self.failures.lock().pop() {
            return Err(StoreError::Relational(message).into());
        }

        let mut state = self.state.lock();
        let mut next = state.clone();
        let mut changes = Vec::new();
        let mut counts = Vec::with_capacity(statements.len());
        for statement in statements {
            counts.push(apply_statement(&mut next, statement, &mut changes)?);
        }
        *state = next;

        let payloads: Vec<String> = changes
            .into_iter()
            .filter(|(table, ..)| state.triggered.contains(table))
            .map(|(table, operation, old, new)| {
                Notification::new(table, operation, origin, old, new).encode_payload()
            })
            .collect();
        drop(state);

        let mut subscribers = self.subscribers.lock();
        for payload in payloads {
            subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(counts)
    }
}

type Change = (TableRef, Operation, Row, Row);

fn apply_statement(
    state: &mut State,
    statement: Statement,
    changes: &mut Vec<Change>,
) -> Result<u64> {
    let name = statement.table().clone();
    let table = state
        .tables
        .get_mut(&name)
        .ok_or_else(|| StoreError::Relational(format!("relation {name} does not exist")))?;

    match statement {
        Statement::Insert {
            values,
            on_conflict,
            ..
        } => {
            let mut row: Row = table.columns.iter().map(|c| (c.clone(), None)).collect();
            for (column, value) in &values {
                check_column(&name, table, column)?;
                row.insert(column.clone(), value.clone());
            }

            let conflict = table.unique.iter().find_map(|key| {
                let wanted: Vec<&Option<String>> = key.iter().map(|c| &row[c]).collect();
                if wanted.iter().any(|v| v.is_none()) {
                    return None;
                }
                table
                    .rows
                    .iter()
                    .position(|existing| key.iter().zip(&wanted).all(|(c, v)| &existing[c] == *v))
                    .map(|index| (key.clone(), index))
            });

            match (conflict, on_conflict) {
                (None, _) => {
                    table.rows.push(row.clone());
                    changes.push((name, Operation::Insert, Row::new(), row));
                    Ok(1)
                }
                (Some((key, _)), OnConflict::DoNothing { target }) if key == target => Ok(0),
                (Some((key, _)), OnConflict::DoUpdate { target, columns })
                    if key == target && columns.is_empty() =>
                {
                    Ok(0)
                }
                (Some((key, index)), OnConflict::DoUpdate { target, columns }) if key == target => {
                    let old = table.rows[index].clone();
                    for column in columns {
                        if let Some((_, value)) = values.iter().find(|(c, _)| *c == column) {
                            table.rows[index].insert(column, value.clone());
                        }
                    }
                    changes.push((name, Operation::Update, old, table.rows[index].clone()));
                    Ok(1)
                }
                (Some((key, _)), _) => Err(StoreError::Constraint {
                    table: name.to_string(),
                    detail: format!("duplicate key ({})", key.join(", ")),
                }
                .into()),
            }
        }
        Statement::Update {
            assignments,
            filter,
            ..
        } => {
            for (column, _) in &assignments {
                check_column(&name, table, column)?;
            }
            let mut count = 0;
            for row in table.rows.iter_mut() {
                if !filter.matches(|c| row.get(c)) {
                    continue;
                }
                let old = row.clone();
                for (column, value) in &assignments {
                    row.insert(column.clone(), value.clone());
                }
                changes.push((name.clone(), Operation::Update, old, row.clone()));
                count += 1;
            }
            Ok(count)
        }
        Statement::Delete { filter, .. } => {
            let mut count = 0;
            table.rows.retain(|row| {
                if filter.matches(|c| row.get(c)) {
                    changes.push((name.clone(), Operation::Delete, row.clone(), Row::new()));
                    count += 1;
                    false
                } else {
                    true
                }
            });
            Ok(count)
        }
    }
}

fn check_column(
    name: &TableRef,
    table: &Table,
    column: &str,
) -> Result<()> {
    if table.columns.iter().any(|c| c == column) {
        Ok(())
    } else {
        Err(StoreError::Relational(format!("column {column} of relation {name} does not exist")).into())
    }
}

/// `"schema"."table"` following `ON ` in a `CREATE TRIGGER` statement.
fn trigger_target(ddl: &str) -> Option<TableRef> {
    let create = ddl.find("CREATE TRIGGER")?;
    let rest = &ddl[create..];
    let on = rest.find(" ON ")?;
    let target = rest[on + 4..].split_whitespace().next()?;
    let (schema, table) = target.split_once('.')?;
    Some(TableRef::new(schema.trim_matches('"'), table.trim_matches('"')))
}

#[async_trait]
impl RelationalStore for MemoryDatabase {
    async fn apply(
        &self,
        origin: &str,
        statements: Vec<Statement>,
    ) -> Result<Vec<u64>> {
        self.commit(origin, statements)
    }

    async fn select(
        &self,
        query: &Select,
    ) -> Result<Vec<Row>> {
        let state = self.state.lock();
        let table = state
            .tables
            .get(&query.table)
            .ok_or_else(|| StoreError::Relational(format!("relation {} does not exist", query.table)))?;
        Ok(table
            .rows
            .iter()
            .filter(|row| query.filter.matches(|c| row.get(c)))
            .map(|row| {
                if query.columns.is_empty() {
                    row.clone()
                } else {
                    row.iter()
                        .filter(|(c, _)| query.columns.contains(c))
                        .map(|(c, v)| (c.clone(), v.clone()))
                        .collect()
                }
            })
            .collect())
    }

    async fn apply_ddl(
        &self,
        sql: &str,
    ) -> Result<()> {
        self.ddl.lock().push(sql.to_string());
        if let Some(table) = trigger_target(sql) {
            self.state.lock().triggered.insert(table);
        }
        Ok(())
    }

    async fn table_columns(
        &self,
        table: &TableRef,
    ) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn subscribe(
        &self,
        _channel: &str,
    ) -> Result<mpsc::UnboundedReceiver<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        Ok(rx)
    }
}
