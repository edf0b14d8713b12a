//! The schema primitive element: emits a complete, internally
//! consistent DDL bundle from table/function/view counts rather than a
//! single string.

use crate::{entropy::EntropyManager, error::Result, quote::Quote};

/// Parameters controlling a schema-primitive expansion.
#[derive(Clone, Debug)]
pub struct SchemaPrimitiveSpec {
    /// Number of tables to emit.
    pub num_tables: u32,
    /// Number of functions to emit.
    pub num_functions: u32,
    /// Number of views to emit.
    pub num_views: u32,
    /// Named complexity profile, e.g. `"small"`, `"oltp"`, `"wide"`.
    pub profile: String,
    /// Fraction of tables that get a foreign key into an earlier table.
    pub fk_ratio: f64,
    /// Fraction of tables that get a secondary index.
    pub index_ratio: f64,
    /// Fraction of tables that get a composite (multi-column) index.
    pub composite_index_ratio: f64,
    /// Fraction of tables that get a partial (`WHERE`-qualified) index.
    pub partial_index_ratio: f64,
}

impl Default for SchemaPrimitiveSpec {
    fn default() -> Self {
        SchemaPrimitiveSpec {
            num_tables: 4,
            num_functions: 0,
            num_views: 0,
            profile: "oltp".to_owned(),
            fk_ratio: 0.5,
            index_ratio: 0.5,
            composite_index_ratio: 0.0,
            partial_index_ratio: 0.0,
        }
    }
}

/// One table's complete `CREATE TABLE` plus any indexes, as DDL text.
#[derive(Clone, Debug)]
pub struct TableDdl {
    /// The (globally unique within the bundle) table name.
    pub name: String,
    /// The full `CREATE TABLE ...` statement.
    pub create_table: String,
    /// Zero or more `CREATE INDEX ...` statements.
    pub indexes: Vec<String>,
}

/// Expands a schema primitive into a single string: the concatenation of
/// every table's DDL, in dependency order (a referenced table always
/// precedes the table that references it), followed by the bundle's
/// functions and views, each separated by a blank line.
pub fn expand(spec: &SchemaPrimitiveSpec, entropy: &EntropyManager) -> Result<String> {
    let tables = generate_tables(spec, entropy);
    let mut out = String::new();
    for table in &tables {
        out.push_str(&table.create_table);
        out.push('\n');
        for index in &table.indexes {
            out.push_str(index);
            out.push('\n');
        }
    }
    for function in generate_functions(spec) {
        out.push_str(&function);
        out.push('\n');
    }
    for view in generate_views(spec, &tables) {
        out.push_str(&view);
        out.push('\n');
    }
    Ok(out)
}

/// Emits `num_functions` trivial, globally-uniquely named SQL functions.
/// Each takes no arguments and returns its own ordinal, which is enough to
/// give the runner layer a distinct, deterministic-for-seed callable per
/// function without depending on any table existing.
fn generate_functions(spec: &SchemaPrimitiveSpec) -> Vec<String> {
    (0..spec.num_functions)
        .map(|i| {
            let name = Quote::Double.escape(&format!("fn_{}", i));
            format!(
                "CREATE FUNCTION {}() RETURNS BIGINT AS $$ SELECT {}::BIGINT $$ LANGUAGE SQL;",
                name, i
            )
        })
        .collect()
}

/// Emits `num_views` views, each a `SELECT *` over one of the generated
/// tables (round-robin if there are more views than tables, and an empty
/// `SELECT` with no `FROM` when there are no tables at all).
fn generate_views(spec: &SchemaPrimitiveSpec, tables: &[TableDdl]) -> Vec<String> {
    (0..spec.num_views)
        .map(|i| {
            let name = Quote::Double.escape(&format!("v_{}", i));
            match tables.get(i as usize % tables.len().max(1)) {
                Some(table) => {
                    let source = Quote::Double.escape(&table.name);
                    format!("CREATE VIEW {} AS SELECT * FROM {};", name, source)
                }
                None => format!("CREATE VIEW {} AS SELECT 1;", name),
            }
        })
        .collect()
}

fn generate_tables(spec: &SchemaPrimitiveSpec, entropy: &EntropyManager) -> Vec<TableDdl> {
    let column_count_range = match spec.profile.as_str() {
        "wide" => (8, 20),
        "small" => (2, 4),
        _ => (3, 8),
    };

    let mut tables = Vec::with_capacity(spec.num_tables as usize);
    for i in 0..spec.num_tables {
        let name = format!("t_{}", i);
        let num_columns = entropy.with_rng(|rng| rng.randint(column_count_range.0, column_count_range.1));

        let mut columns = vec!["id BIGINT PRIMARY KEY".to_owned()];
        for c in 0..num_columns {
            columns.push(format!("c_{} TEXT", c));
        }

        let wants_fk = i > 0 && entropy.with_rng(|rng| rng.random()) < spec.fk_ratio;
        if wants_fk {
            let parent = entropy.with_rng(|rng| rng.randint(0, i64::from(i) - 1)) as u32;
            columns.push(format!("parent_id BIGINT REFERENCES t_{}(id)", parent));
        }

        let quoted_name = Quote::Double.escape(&name);
        let create_table = format!("CREATE TABLE {} (\n  {}\n);", quoted_name, columns.join(",\n  "));

        let mut indexes = Vec::new();
        if entropy.with_rng(|rng| rng.random()) < spec.index_ratio && num_columns > 0 {
            indexes.push(format!("CREATE INDEX idx_{}_c_0 ON {} (c_0);", name, quoted_name));
        }
        if entropy.with_rng(|rng| rng.random()) < spec.composite_index_ratio && num_columns > 1 {
            indexes.push(format!(
                "CREATE INDEX idx_{}_composite ON {} (c_0, c_1);",
                name, quoted_name
            ));
        }
        if entropy.with_rng(|rng| rng.random()) < spec.partial_index_ratio && num_columns > 0 {
            indexes.push(format!(
                "CREATE INDEX idx_{}_partial ON {} (c_0) WHERE c_0 IS NOT NULL;",
                name, quoted_name
            ));
        }

        tables.push(TableDdl {
            name,
            create_table,
            indexes,
        });
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::{EntropyConfig, EntropyManager};

    #[test]
    fn every_table_name_is_unique_and_fks_point_backward() {
        let entropy = EntropyManager::new(EntropyConfig {
            base_seed: Some(5),
            ..EntropyConfig::default()
        });
        let spec = SchemaPrimitiveSpec {
            num_tables: 6,
            fk_ratio: 1.0,
            ..SchemaPrimitiveSpec::default()
        };
        let tables = generate_tables(&spec, &entropy);
        let names: std::collections::HashSet<_> = tables.iter().map(|t| t.name.clone()).collect();
        assert_eq!(names.len(), tables.len());

        for (i, table) in tables.iter().enumerate() {
            if let Some(paren) = table.create_table.find("REFERENCES t_") {
                let rest = &table.create_table[paren + "REFERENCES t_".len()..];
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                let parent: usize = digits.parse().unwrap();
                assert!(parent < i);
            }
        }
    }

    #[test]
    fn functions_and_views_are_emitted_with_globally_unique_names() {
        let entropy = EntropyManager::new(EntropyConfig {
            base_seed: Some(11),
            ..EntropyConfig::default()
        });
        let spec = SchemaPrimitiveSpec {
            num_tables: 2,
            num_functions: 3,
            num_views: 5,
            ..SchemaPrimitiveSpec::default()
        };
        let ddl = expand(&spec, &entropy).unwrap();
        assert_eq!(ddl.matches("CREATE FUNCTION").count(), 3);
        assert_eq!(ddl.matches("CREATE VIEW").count(), 5);

        let tables = generate_tables(&spec, &entropy);
        let functions = generate_functions(&spec);
        let views = generate_views(&spec, &tables);
        let mut names: std::collections::HashSet<_> =
            tables.iter().map(|t| t.name.clone()).collect();
        for (i, f) in functions.iter().enumerate() {
            assert!(f.contains(&format!("\"fn_{}\"", i)));
            assert!(names.insert(format!("fn_{}", i)), "function name collided");
        }
        for (i, v) in views.iter().enumerate() {
            assert!(v.contains(&format!("\"v_{}\"", i)));
            assert!(names.insert(format!("v_{}", i)), "view name collided");
        }
    }

    #[test]
    fn views_over_an_empty_schema_still_validate_as_sql() {
        let spec = SchemaPrimitiveSpec {
            num_tables: 0,
            num_views: 2,
            ..SchemaPrimitiveSpec::default()
        };
        let views = generate_views(&spec, &[]);
        assert_eq!(views.len(), 2);
        assert!(views.iter().all(|v| v.contains("SELECT 1")));
    }
}
