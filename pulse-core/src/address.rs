//! Address naming rules
//!
//! Addresses are named data endpoints (tables, file paths, queues). Names are
//! globally unique and case-insensitive: they are lower-cased before storage.
//! When the address type belongs to the `database` group, a dotted name is
//! parsed into database/schema/table parts.

/// Address-type group whose members get their name parsed into parts.
pub const DATABASE_GROUP: &str = "database";

/// Parsed components of a database-group address name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressParts {
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
}

/// Normalize an address name and, for database-group addresses, split the
/// dotted form into its parts.
///
/// Returns the lower-cased name together with the parsed parts. Names with
/// fewer than three dotted segments fill from the right: `schema.table` has
/// no database part, a bare `table` has neither.
pub fn parse_address_name(name: &str, group_name: &str) -> (String, AddressParts) {
    let normalized = name.trim().to_lowercase();

    if group_name != DATABASE_GROUP {
        return (normalized, AddressParts::default());
    }

    let segments: Vec<&str> = normalized.split('.').collect();
    let parts = match segments.as_slice() {
        [db, schema, table, ..] => AddressParts {
            database_name: Some((*db).to_string()),
            schema_name: Some((*schema).to_string()),
            table_name: Some((*table).to_string()),
        },
        [schema, table] => AddressParts {
            database_name: None,
            schema_name: Some((*schema).to_string()),
            table_name: Some((*table).to_string()),
        },
        [table] => AddressParts {
            database_name: None,
            schema_name: None,
            table_name: Some((*table).to_string()),
        },
        [] => AddressParts::default(),
    };

    (normalized, parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_trims() {
        let (name, _) = parse_address_name("  Warehouse.Dbo.Orders ", DATABASE_GROUP);
        assert_eq!(name, "warehouse.dbo.orders");
    }

    #[test]
    fn parses_three_part_database_name() {
        let (_, parts) = parse_address_name("warehouse.dbo.orders", DATABASE_GROUP);
        assert_eq!(parts.database_name.as_deref(), Some("warehouse"));
        assert_eq!(parts.schema_name.as_deref(), Some("dbo"));
        assert_eq!(parts.table_name.as_deref(), Some("orders"));
    }

    #[test]
    fn fills_from_the_right_for_short_names() {
        let (_, parts) = parse_address_name("dbo.orders", DATABASE_GROUP);
        assert_eq!(parts.database_name, None);
        assert_eq!(parts.schema_name.as_deref(), Some("dbo"));
        assert_eq!(parts.table_name.as_deref(), Some("orders"));

        let (_, parts) = parse_address_name("orders", DATABASE_GROUP);
        assert_eq!(parts.schema_name, None);
        assert_eq!(parts.table_name.as_deref(), Some("orders"));
    }

    #[test]
    fn non_database_group_is_not_parsed() {
        let (name, parts) = parse_address_name("s3://bucket/path.parquet", "object_storage");
        assert_eq!(name, "s3://bucket/path.parquet");
        assert_eq!(parts, AddressParts::default());
    }
}
