//! SQL generation.
//!
//! Pure builders that write one statement into an [`ArenaScope`]. They know
//! the entity layout and ask the [`Driver`] for dialect details (column
//! types, placeholders, auto-increment keyword, LIMIT syntax); they never
//! touch a connection.
//!
//! Identifiers are always double-quoted, with embedded quotes doubled, so
//! reserved words and mixed-case table names are safe in both dialects.

use corm_common::{FieldFlags, FieldType};

use crate::arena::ArenaScope;
use crate::db::Driver;
use crate::model::{Entity, Field};
use crate::registry::Registry;

// ── Helpers ──────────────────────────────────────────────────────────

/// Quote a SQL identifier with double quotes, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn push_ident(sql: &mut ArenaScope<'_>, name: &str) {
    sql.push(&quote_ident(name));
}

/// Fields written by INSERT: every column except auto-increment keys.
pub(crate) fn insert_fields(entity: &Entity) -> Vec<&Field> {
    entity.columns().filter(|f| !f.is_auto_increment()).collect()
}

/// Fields written by UPDATE's SET list: every column except the key.
pub(crate) fn update_fields(entity: &Entity) -> Vec<&Field> {
    entity
        .columns()
        .filter(|f| !f.is_primary_key() && !f.is_auto_increment())
        .collect()
}

fn pk_name(entity: &Entity) -> &str {
    entity.primary_key().map_or("id", |f| f.name())
}

// ── DDL ──────────────────────────────────────────────────────────────

/// `CREATE TABLE IF NOT EXISTS` with column constraints and one FOREIGN KEY
/// clause per resolved belongs-to field.
///
/// Column constraints are emitted in a fixed order: PRIMARY KEY, the
/// dialect's auto-increment keyword, NOT NULL, UNIQUE.
pub fn create_table(sql: &mut ArenaScope<'_>, driver: &dyn Driver, registry: &Registry, entity: &Entity) {
    sql.push("CREATE TABLE IF NOT EXISTS ");
    push_ident(sql, entity.table());
    sql.push(" (");

    let mut first = true;
    for field in entity.columns() {
        if !first {
            sql.push(", ");
        }
        first = false;

        push_ident(sql, field.name());
        sql.push_char(' ');
        sql.push(&driver.type_name(field.kind(), field.max_len()));

        if field.is_primary_key() {
            sql.push(" PRIMARY KEY");
            let keyword = driver.auto_increment();
            if field.is_auto_increment() && !keyword.is_empty() {
                sql.push_char(' ');
                sql.push(keyword);
            }
        }
        let flags = field.field_flags();
        if flags.contains(FieldFlags::NOT_NULL) {
            sql.push(" NOT NULL");
        }
        if flags.contains(FieldFlags::UNIQUE) {
            sql.push(" UNIQUE");
        }
    }

    for field in entity.fields() {
        if field.kind() != FieldType::BelongsTo {
            continue;
        }
        let Some(rel) = field.relation_info() else {
            continue;
        };
        let Some(target) = rel.resolved().and_then(|idx| registry.get(idx)) else {
            continue;
        };
        sql.push(", FOREIGN KEY (");
        push_ident(sql, &rel.foreign_key);
        sql.push(") REFERENCES ");
        push_ident(sql, target.table());
        sql.push_char('(');
        push_ident(sql, pk_name(target));
        sql.push_char(')');
        sql.push(rel.on_delete.sql_suffix());
    }

    sql.push(");");
}

pub fn drop_table(sql: &mut ArenaScope<'_>, table: &str) {
    sql.push("DROP TABLE IF EXISTS ");
    push_ident(sql, table);
    sql.push_char(';');
}

// ── DML ──────────────────────────────────────────────────────────────

/// `SELECT COUNT(*) FROM "t" WHERE "pk" = <ph1>;`
pub fn count_by_pk(sql: &mut ArenaScope<'_>, driver: &dyn Driver, entity: &Entity) {
    sql.push("SELECT COUNT(*) FROM ");
    push_ident(sql, entity.table());
    push_pk_filter(sql, driver, entity, 1);
}

fn push_pk_filter(sql: &mut ArenaScope<'_>, driver: &dyn Driver, entity: &Entity, index: usize) {
    sql.push(" WHERE ");
    push_ident(sql, pk_name(entity));
    sql.push(" = ");
    sql.push(&driver.placeholder(index));
    sql.push_char(';');
}

/// INSERT over [`insert_fields`]. When the dialect supports it and the key
/// is generated, a `RETURNING` clause reports the new key.
///
/// Returns whether a `RETURNING` clause was emitted.
pub fn insert(sql: &mut ArenaScope<'_>, driver: &dyn Driver, entity: &Entity) -> bool {
    sql.push("INSERT INTO ");
    push_ident(sql, entity.table());

    let fields = insert_fields(entity);
    if fields.is_empty() {
        sql.push(" DEFAULT VALUES");
    } else {
        sql.push(" (");
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            push_ident(sql, field.name());
        }
        sql.push(") VALUES (");
        for i in 1..=fields.len() {
            if i > 1 {
                sql.push(", ");
            }
            sql.push(&driver.placeholder(i));
        }
        sql.push_char(')');
    }

    let returning = driver.supports_returning()
        && entity.primary_key().is_some_and(|pk| pk.is_auto_increment());
    if returning {
        sql.push(" RETURNING ");
        push_ident(sql, pk_name(entity));
    }
    sql.push_char(';');
    returning
}

/// `UPDATE "t" SET "a" = <ph1>, ... WHERE "pk" = <phN>;` over [`update_fields`].
pub fn update(sql: &mut ArenaScope<'_>, driver: &dyn Driver, entity: &Entity) {
    sql.push("UPDATE ");
    push_ident(sql, entity.table());
    sql.push(" SET ");

    let fields = update_fields(entity);
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        push_ident(sql, field.name());
        sql.push(" = ");
        sql.push(&driver.placeholder(i + 1));
    }
    push_pk_filter(sql, driver, entity, fields.len() + 1);
}

pub fn delete_by_pk(sql: &mut ArenaScope<'_>, driver: &dyn Driver, entity: &Entity) {
    sql.push("DELETE FROM ");
    push_ident(sql, entity.table());
    push_pk_filter(sql, driver, entity, 1);
}

pub fn select_by_pk(sql: &mut ArenaScope<'_>, driver: &dyn Driver, entity: &Entity) {
    sql.push("SELECT * FROM ");
    push_ident(sql, entity.table());
    push_pk_filter(sql, driver, entity, 1);
}

/// `SELECT * FROM "t" WHERE "column" = <ph1>;`
pub fn select_by_column(sql: &mut ArenaScope<'_>, driver: &dyn Driver, table: &str, column: &str) {
    sql.push("SELECT * FROM ");
    push_ident(sql, table);
    sql.push(" WHERE ");
    push_ident(sql, column);
    sql.push(" = ");
    sql.push(&driver.placeholder(1));
    sql.push_char(';');
}

/// Parts of a SELECT assembled by the query builder.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectParts<'q> {
    pub where_clause: Option<&'q str>,
    pub order_by: Option<&'q str>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// `SELECT * FROM "t" [WHERE ...] [ORDER BY ...] [LIMIT/OFFSET];`
///
/// Every `?` marker in the WHERE text outside a single-quoted literal is
/// rewritten left to right into the dialect placeholder. Returns the
/// number of markers rewritten.
pub fn select(sql: &mut ArenaScope<'_>, driver: &dyn Driver, table: &str, parts: SelectParts<'_>) -> usize {
    sql.push("SELECT * FROM ");
    push_ident(sql, table);

    let mut markers = 0;
    if let Some(clause) = parts.where_clause.filter(|c| !c.trim().is_empty()) {
        sql.push(" WHERE ");
        markers = rewrite_placeholders(sql, driver, clause);
    }
    if let Some(order) = parts.order_by.filter(|o| !o.trim().is_empty()) {
        sql.push(" ORDER BY ");
        sql.push(order);
    }
    sql.push(&driver.limit_clause(parts.limit, parts.offset));
    sql.push_char(';');
    markers
}

fn rewrite_placeholders(sql: &mut ArenaScope<'_>, driver: &dyn Driver, clause: &str) -> usize {
    let mut count = 0;
    let mut in_literal = false;
    for c in clause.chars() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                sql.push_char(c);
            }
            '?' if !in_literal => {
                count += 1;
                sql.push(&driver.placeholder(count));
            }
            _ => sql.push_char(c),
        }
    }
    count
}

/// Count the `?` markers [`select`] would rewrite.
pub fn count_markers(clause: &str) -> usize {
    let mut count = 0;
    let mut in_literal = false;
    for c in clause.chars() {
        match c {
            '\'' => in_literal = !in_literal,
            '?' if !in_literal => count += 1,
            _ => {}
        }
    }
    count
}
