#![forbid(unsafe_code)]
//! SQL text for entity CRUD and for the hi/lo counter table, built from the
//! metadata traits in `hilo_core`.
//!
//! Statements use SQLite's positional `?` placeholders. Identifiers are
//! interpolated as given; callers pass only names taken from entity metadata.

/// SQLite binds positional parameters with a bare `?`.
const PH: &str = "?";

fn placeholders(n: usize) -> String {
    vec![PH; n].join(", ")
}

/// Build a simple SELECT ... WHERE id = <ph> statement using metadata from `E`.
pub fn select_by_id<E>(id_column: &str) -> String
where
    E: hilo_core::Fetchable,
{
    let cols = E::SELECT_COLUMNS.join(", ");
    let table = E::TABLE;
    let ph = PH;
    format!(
        "SELECT {cols} FROM {table} WHERE {id} = {ph}",
        cols = cols,
        table = table,
        id = id_column,
        ph = ph
    )
}

/// Build DELETE ... WHERE id = <ph>
pub fn delete_by_id<E>(id_column: &str) -> String
where
    E: hilo_core::Fetchable,
{
    let table = E::TABLE;
    let ph = PH;
    format!(
        "DELETE FROM {table} WHERE {id} = {ph}",
        table = table,
        id = id_column,
        ph = ph
    )
}

/// Build INSERT INTO <table> (<cols>) VALUES (<placeholders>)
///
/// Keys are assigned before insert, so the key column is one of
/// `E::INSERT_COLUMNS` and nothing is returned.
pub fn insert<E>() -> String
where
    E: hilo_core::Fetchable + hilo_core::Insertable,
{
    let cols = E::INSERT_COLUMNS;
    let table = E::TABLE;
    format!(
        "INSERT INTO {table} ({cols}) VALUES ({vals})",
        table = table,
        cols = cols.join(", "),
        vals = placeholders(cols.len())
    )
}

/// Build UPDATE <table> SET <col1>=<ph1>, ... WHERE <id>=<phN>
pub fn update_by_id<E>(id_column: &str) -> String
where
    E: hilo_core::Fetchable + hilo_core::Updatable,
{
    let cols = E::UPDATE_COLUMNS;
    let table = E::TABLE;
    let assignments: Vec<String> = cols.iter().map(|col| format!("{col} = {PH}")).collect();
    format!(
        "UPDATE {table} SET {set_clause} WHERE {id} = {PH}",
        table = table,
        set_clause = assignments.join(", "),
        id = id_column,
    )
}

/// Build SELECT ... WHERE <field> = <ph>
///
/// `field` is spliced into the statement; check it with
/// [`hilo_core::findable_column`] first.
pub fn select_by_field<E>(field: &str) -> String
where
    E: hilo_core::Fetchable,
{
    let cols = E::SELECT_COLUMNS.join(", ");
    let table = E::TABLE;
    let ph = PH;
    format!(
        "SELECT {cols} FROM {table} WHERE {field} = {ph}",
        cols = cols,
        table = table,
        field = field,
        ph = ph
    )
}

/// Names of the table holding hi/lo counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterTable {
    pub table: String,
    pub key_column: String,
    pub value_column: String,
}

impl Default for CounterTable {
    fn default() -> Self {
        Self {
            table: "hilo_counters".to_string(),
            key_column: "block_name".to_string(),
            value_column: "next_high".to_string(),
        }
    }
}

/// Build SELECT <value> FROM <counters> WHERE <key> = <ph>
pub fn select_counter(t: &CounterTable) -> String {
    let ph = PH;
    format!(
        "SELECT {value} FROM {table} WHERE {key} = {ph}",
        value = t.value_column,
        table = t.table,
        key = t.key_column,
        ph = ph
    )
}

/// Build an INSERT that leaves an existing counter row untouched.
/// Parameters: key, value. Zero affected rows means the row already existed.
pub fn insert_counter_if_absent(t: &CounterTable) -> String {
    format!(
        "INSERT INTO {table} ({key}, {value}) VALUES ({vals}) ON CONFLICT ({key}) DO NOTHING",
        table = t.table,
        key = t.key_column,
        value = t.value_column,
        vals = placeholders(2),
    )
}

/// Build the conditional counter update.
/// Parameters: new value, key, expected value. One affected row means the swap won.
pub fn compare_and_swap_counter(t: &CounterTable) -> String {
    format!(
        "UPDATE {table} SET {value} = {PH} WHERE {key} = {PH} AND {value} = {PH}",
        table = t.table,
        key = t.key_column,
        value = t.value_column,
    )
}
