use crate::key::quote_ident;
use crate::key::TableRef;

/// Conjunction of column equalities. A `None` value matches SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter(pub Vec<(String, Option<String>)>);

impl Filter {
    pub fn eq(
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self(vec![(column.into(), Some(value.into()))])
    }

    pub fn and(
        mut self,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.0.push((column.into(), Some(value.into())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a row (column lookup) satisfies every equality.
    pub fn matches<'a>(
        &self,
        lookup: impl Fn(&str) -> Option<&'a Option<String>>,
    ) -> bool {
        self.0.iter().all(|(column, expected)| match lookup(column) {
            Some(actual) => actual == expected,
            None => expected.is_none(),
        })
    }

    fn render(
        &self,
        params: &mut Vec<Option<String>>,
    ) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let clauses: Vec<String> = self
            .0
            .iter()
            .map(|(column, value)| match value {
                Some(v) => {
                    params.push(Some(v.clone()));
                    format!("{} = ${}", quote_ident(column), params.len())
                }
                None => format!("{} IS NULL", quote_ident(column)),
            })
            .collect();
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnConflict {
    /// Constraint violations fail the statement
    Fail,
    DoNothing { target: Vec<String> },
    /// Overwrites `columns` of the conflicting row with the proposed values
    DoUpdate {
        target: Vec<String>,
        columns: Vec<String>,
    },
}

/// Mutation the engine asks a [`RelationalStore`](super::RelationalStore) to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Insert {
        table: TableRef,
        values: Vec<(String, Option<String>)>,
        on_conflict: OnConflict,
    },
    Update {
        table: TableRef,
        assignments: Vec<(String, Option<String>)>,
        filter: Filter,
    },
    Delete {
        table: TableRef,
        filter: Filter,
    },
}

impl Statement {
    pub fn table(&self) -> &TableRef {
        match self {
            Statement::Insert { table, .. } => table,
            Statement::Update { table, .. } => table,
            Statement::Delete { table, .. } => table,
        }
    }

    /// Parameterized PostgreSQL text and its text parameters (`$1`, `$2`, ...).
    pub fn to_sql(&self) -> (String, Vec<Option<String>>) {
        let mut params = Vec::new();
        let sql = match self {
            Statement::Insert {
                table,
                values,
                on_conflict,
            } => {
                let columns: Vec<String> = values.iter().map(|(c, _)| quote_ident(c)).collect();
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|(_, v)| {
                        params.push(v.clone());
                        format!("${}", params.len())
                    })
                    .collect();
                let conflict = match on_conflict {
                    OnConflict::Fail => String::new(),
                    OnConflict::DoNothing { target } => {
                        format!(" ON CONFLICT ({}) DO NOTHING", ident_list(target))
                    }
                    OnConflict::DoUpdate { target, columns } if columns.is_empty() => {
                        format!(" ON CONFLICT ({}) DO NOTHING", ident_list(target))
                    }
                    OnConflict::DoUpdate { target, columns } => {
                        let sets: Vec<String> = columns
                            .iter()
                            .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
                            .collect();
                        format!(
                            " ON CONFLICT ({}) DO UPDATE SET {}",
                            ident_list(target),
                            sets.join(", ")
                        )
                    }
                };
                format!(
                    "INSERT INTO {} ({}) VALUES ({}){}",
                    table.quoted(),
                    columns.join(", "),
                    placeholders.join(", "),
                    conflict
                )
            }
            Statement::Update {
                table,
                assignments,
                filter,
            } => {
                let sets: Vec<String> = assignments
                    .iter()
                    .map(|(c, v)| {
                        params.push(v.clone());
                        format!("{} = ${}", quote_ident(c), params.len())
                    })
                    .collect();
                let where_clause = filter.render(&mut params);
                format!("UPDATE {} SET {}{}", table.quoted(), sets.join(", "), where_clause)
            }
            Statement::Delete { table, filter } => {
                let where_clause = filter.render(&mut params);
                format!("DELETE FROM {}{}", table.quoted(), where_clause)
            }
        };
        (sql, params)
    }
}

/// Equality-filtered read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub table: TableRef,
    /// Empty selects every column
    pub columns: Vec<String>,
    pub filter: Filter,
}

impl Select {
    pub fn all(table: &TableRef) -> Self {
        Self {
            table: table.clone(),
            columns: Vec::new(),
            filter: Filter::default(),
        }
    }

    pub fn by(
        table: &TableRef,
        filter: Filter,
    ) -> Self {
        Self {
            table: table.clone(),
            columns: Vec::new(),
            filter,
        }
    }

    pub fn columns(
        mut self,
        columns: Vec<String>,
    ) -> Self {
        self.columns = columns;
        self
    }

    /// Columns are cast to text so every value comes back in its canonical
    /// text rendering.
    pub fn to_sql(&self) -> (String, Vec<Option<String>>) {
        let mut params = Vec::new();
        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| format!("{0}::text AS {0}", quote_ident(c)))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let where_clause = self.filter.render(&mut params);
        (
            format!("SELECT {} FROM {}{}", projection, self.table.quoted(), where_clause),
            params,
        )
    }
}

fn ident_list(columns: &[String]) -> String {
    columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}
