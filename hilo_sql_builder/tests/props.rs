use hilo_core::{Fetchable, Insertable, ParamValue, Updatable};
use hilo_sql_builder::CounterTable;
use proptest::prelude::*;

struct Person;

impl Fetchable for Person {
    const TABLE: &'static str = "people_props";
    const SELECT_COLUMNS: &'static [&'static str] = &["id", "email_address", "full_name"];
    const FINDABLE_COLUMNS: &'static [(&'static str, &'static str)] =
        &[("email_address", "String"), ("full_name", "String")];
}

impl Insertable for Person {
    const INSERT_COLUMNS: &'static [&'static str] = &["id", "email_address", "full_name"];
    fn insert_values(&self) -> Vec<ParamValue> {
        Vec::new()
    }
}

impl Updatable for Person {
    const UPDATE_COLUMNS: &'static [&'static str] = &["email_address", "full_name"];
    fn update_values(&self) -> Vec<ParamValue> {
        Vec::new()
    }
}

fn placeholder_count(sql: &str) -> usize {
    sql.matches('?').count()
}

#[test]
fn entity_statements_bind_one_placeholder_per_column() {
    let insert = hilo_sql_builder::insert::<Person>();
    assert_eq!(placeholder_count(&insert), Person::INSERT_COLUMNS.len());
    let update = hilo_sql_builder::update_by_id::<Person>("id");
    let expected = Person::UPDATE_COLUMNS.len() + 1;
    assert_eq!(placeholder_count(&update), expected);
}

proptest! {
    // Property: counter statements mention the configured names and bind the
    // expected number of parameters, whatever the identifiers are.
    #[test]
    fn counter_statements_use_configured_names(
        table in "[a-z][a-z_]{0,12}",
        key in "[a-z][a-z_]{0,12}",
        value in "[a-z][a-z_]{0,12}",
    ) {
        prop_assume!(key != value);
        let t = CounterTable { table: table.clone(), key_column: key.clone(), value_column: value.clone() };

        let select = hilo_sql_builder::select_counter(&t);
        let select_prefix = format!("SELECT {} FROM {} WHERE {} = ", value, table, key);
        prop_assert!(select.starts_with(&select_prefix));
        prop_assert_eq!(placeholder_count(&select), 1);

        let insert = hilo_sql_builder::insert_counter_if_absent(&t);
        let conflict_clause = format!("ON CONFLICT ({}) DO NOTHING", key);
        prop_assert!(insert.ends_with(&conflict_clause));
        prop_assert_eq!(placeholder_count(&insert), 2);

        let cas = hilo_sql_builder::compare_and_swap_counter(&t);
        let cas_prefix = format!("UPDATE {} SET {} = ", table, value);
        prop_assert!(cas.starts_with(&cas_prefix));
        prop_assert_eq!(placeholder_count(&cas), 3);
    }
}
