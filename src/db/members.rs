use rusqlite::{params, Connection, OptionalExtension, Row};

use super::map_constraint;
use crate::error::{LendingError, LendingResult};
use crate::models::{Member, NewMember};

const MEMBER_COLUMNS: &str =
    "id, name, email, phone, username, password, membership_type, active";

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        username: row.get(4)?,
        password: row.get(5)?,
        membership_type: row.get(6)?,
        active: row.get(7)?,
    })
}

fn query_members<P: rusqlite::Params>(
    conn: &Connection,
    filter: &str,
    params: P,
) -> LendingResult<Vec<Member>> {
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM members {filter} ORDER BY name COLLATE NOCASE, id");
    let mut stmt = conn.prepare(&sql)?;
    let members = stmt
        .query_map(params, member_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(members)
}

fn find_member_by(conn: &Connection, column: &str, value: &str) -> LendingResult<Option<Member>> {
    let member = conn
        .query_row(
            &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE {column} = ?1"),
            [value],
            member_from_row,
        )
        .optional()?;
    Ok(member)
}

/// Which unique column a failed insert or update collided with. SQLite names
/// the column in the message (`UNIQUE constraint failed: members.email`).
fn duplicate_message(err: &rusqlite::Error, username: &str, email: &str) -> String {
    if err.to_string().contains("members.email") {
        format!("Email already exists: {email}")
    } else {
        format!("Username already exists: {username}")
    }
}

pub fn fetch_member(conn: &Connection, id: i64) -> LendingResult<Member> {
    conn.query_row(
        &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1"),
        [id],
        member_from_row,
    )
    .optional()?
    .ok_or_else(|| LendingError::NotFound(format!("Member not found with ID: {id}")))
}

pub fn find_member_by_username(conn: &Connection, username: &str) -> LendingResult<Option<Member>> {
    find_member_by(conn, "username", username)
}

pub fn find_member_by_email(conn: &Connection, email: &str) -> LendingResult<Option<Member>> {
    find_member_by(conn, "email", email)
}

pub fn fetch_members(conn: &Connection) -> LendingResult<Vec<Member>> {
    query_members(conn, "", [])
}

pub fn fetch_active_members(conn: &Connection) -> LendingResult<Vec<Member>> {
    query_members(conn, "WHERE active = 1", [])
}

/// Case-insensitive substring match over name, email and username.
pub fn search_members(conn: &Connection, keyword: &str) -> LendingResult<Vec<Member>> {
    query_members(
        conn,
        "WHERE LOWER(name) LIKE '%' || LOWER(?1) || '%'
            OR LOWER(email) LIKE '%' || LOWER(?1) || '%'
            OR LOWER(username) LIKE '%' || LOWER(?1) || '%'",
        [keyword],
    )
}

pub fn insert_member(conn: &Connection, member: &NewMember) -> LendingResult<Member> {
    conn.execute(
        "INSERT INTO members (name, email, phone, username, password, membership_type, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            member.name,
            member.email,
            member.phone,
            member.username,
            member.password,
            member.membership_type,
            member.active,
        ],
    )
    .map_err(|err| {
        let message = duplicate_message(&err, &member.username, &member.email);
        map_constraint(err, || message)
    })?;

    Ok(Member {
        id: conn.last_insert_rowid(),
        name: member.name.clone(),
        email: member.email.clone(),
        phone: member.phone.clone(),
        username: member.username.clone(),
        password: member.password.clone(),
        membership_type: member.membership_type.clone(),
        active: member.active,
    })
}

/// Overwrite every column of an existing member.
pub fn update_member(conn: &Connection, member: &Member) -> LendingResult<()> {
    let updated = conn
        .execute(
            "UPDATE members
             SET name = ?1, email = ?2, phone = ?3, username = ?4, password = ?5,
                 membership_type = ?6, active = ?7
             WHERE id = ?8",
            params![
                member.name,
                member.email,
                member.phone,
                member.username,
                member.password,
                member.membership_type,
                member.active,
                member.id,
            ],
        )
        .map_err(|err| {
            let message = duplicate_message(&err, &member.username, &member.email);
            map_constraint(err, || message)
        })?;

    if updated == 0 {
        Err(LendingError::NotFound(format!("Member not found with ID: {}", member.id)))
    } else {
        Ok(())
    }
}

/// Remove a member row. Loan history cascades with it, so callers must make
/// sure nothing is still out on loan first.
pub fn delete_member(conn: &Connection, id: i64) -> LendingResult<()> {
    let deleted = conn.execute("DELETE FROM members WHERE id = ?1", [id])?;

    if deleted == 0 {
        Err(LendingError::NotFound(format!("Member not found with ID: {id}")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn new_member(username: &str, email: &str, active: bool) -> NewMember {
        NewMember {
            name: format!("Reader {username}"),
            email: email.to_string(),
            phone: Some("555-0100".to_string()),
            username: username.to_string(),
            password: "secret".to_string(),
            membership_type: "STANDARD".to_string(),
            active,
        }
    }

    #[test]
    fn lookups_by_every_unique_key() {
        let conn = open_in_memory().unwrap();
        let member = insert_member(&conn, &new_member("ada", "ada@example.org", true)).unwrap();

        assert_eq!(fetch_member(&conn, member.id).unwrap(), member);
        assert_eq!(find_member_by_username(&conn, "ada").unwrap(), Some(member.clone()));
        assert_eq!(find_member_by_email(&conn, "ada@example.org").unwrap(), Some(member));
        assert_eq!(find_member_by_email(&conn, "nobody@example.org").unwrap(), None);
    }

    #[test]
    fn unique_columns_report_which_one_collided() {
        let conn = open_in_memory().unwrap();
        insert_member(&conn, &new_member("ada", "ada@example.org", true)).unwrap();

        match insert_member(&conn, &new_member("ada", "other@example.org", true)) {
            Err(LendingError::Duplicate(message)) => assert!(message.contains("Username")),
            other => panic!("expected duplicate username, got {other:?}"),
        }
        match insert_member(&conn, &new_member("grace", "ada@example.org", true)) {
            Err(LendingError::Duplicate(message)) => assert!(message.contains("Email")),
            other => panic!("expected duplicate email, got {other:?}"),
        }
    }

    #[test]
    fn active_filter_and_search() {
        let conn = open_in_memory().unwrap();
        insert_member(&conn, &new_member("ada", "ada@example.org", true)).unwrap();
        insert_member(&conn, &new_member("grace", "grace@navy.mil", false)).unwrap();

        assert_eq!(fetch_members(&conn).unwrap().len(), 2);
        assert_eq!(fetch_active_members(&conn).unwrap().len(), 1);
        assert_eq!(search_members(&conn, "NAVY").unwrap()[0].username, "grace");
    }

    #[test]
    fn update_and_delete_missing_member() {
        let conn = open_in_memory().unwrap();
        let mut member = insert_member(&conn, &new_member("ada", "ada@example.org", true)).unwrap();

        member.active = false;
        update_member(&conn, &member).unwrap();
        assert!(!fetch_member(&conn, member.id).unwrap().active);

        delete_member(&conn, member.id).unwrap();
        assert!(matches!(fetch_member(&conn, member.id), Err(LendingError::NotFound(_))));
        assert!(matches!(update_member(&conn, &member), Err(LendingError::NotFound(_))));
    }
}
