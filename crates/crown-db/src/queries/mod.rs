pub mod conversations;
pub mod listings;
pub mod repairs;
pub mod stores;
pub mod users;

use anyhow::Result;
use rusqlite::Connection;

/// Derive a unique URL slug for `name` within `table` (which must have a
/// `slug` column). Collisions get a `-N` suffix.
pub(crate) fn unique_slug(conn: &Connection, table: &str, name: &str) -> Result<String> {
    let base = slugify(name);
    let mut candidate = base.clone();
    let mut i = 1;
    loop {
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE slug = ?1");
        let taken: i64 = conn.query_row(&sql, [&candidate], |row| row.get(0))?;
        if taken == 0 {
            return Ok(candidate);
        }
        candidate = format!("{base}-{i}");
        i += 1;
    }
}

pub(crate) fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "item".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn slugs_are_lowercase_dashed() {
        assert_eq!(slugify("Geneva Watch Co."), "geneva-watch-co");
        assert_eq!(slugify("  A  B  "), "a-b");
        assert_eq!(slugify("!!!"), "item");
    }
}
