//! Member management with username and email uniqueness.

use tracing::{error, info};

use crate::db;
use crate::engine::LendingEngine;
use crate::error::{LendingError, LendingResult};
use crate::models::{Member, MemberUpdate, NewMember};

fn validate_member(name: &str, email: &str, username: &str, membership_type: &str) -> LendingResult<()> {
    for (field, value) in [
        ("Name", name),
        ("Email", email),
        ("Username", username),
        ("Membership type", membership_type),
    ] {
        if value.trim().is_empty() {
            return Err(LendingError::Validation(format!("{field} is required")));
        }
    }
    if !email.contains('@') {
        return Err(LendingError::Validation(format!("Email is not valid: {email}")));
    }
    Ok(())
}

impl LendingEngine {
    pub fn member(&self, id: i64) -> LendingResult<Member> {
        db::fetch_member(&self.conn, id)
    }

    pub fn member_by_username(&self, username: &str) -> LendingResult<Member> {
        db::find_member_by_username(&self.conn, username)?.ok_or_else(|| {
            LendingError::NotFound(format!("Member not found with username: {username}"))
        })
    }

    pub fn member_by_email(&self, email: &str) -> LendingResult<Member> {
        db::find_member_by_email(&self.conn, email)?
            .ok_or_else(|| LendingError::NotFound(format!("Member not found with email: {email}")))
    }

    pub fn members(&self) -> LendingResult<Vec<Member>> {
        db::fetch_members(&self.conn)
    }

    pub fn active_members(&self) -> LendingResult<Vec<Member>> {
        db::fetch_active_members(&self.conn)
    }

    pub fn search_members(&self, keyword: &str) -> LendingResult<Vec<Member>> {
        db::search_members(&self.conn, keyword)
    }

    pub fn create_member(&mut self, member: NewMember) -> LendingResult<Member> {
        info!(username = %member.username, "Creating new member");
        validate_member(&member.name, &member.email, &member.username, &member.membership_type)?;
        if member.password.is_empty() {
            return Err(LendingError::Validation("Password is required".to_string()));
        }

        let created = self.transact("create_member", |tx, _| {
            if db::find_member_by_username(tx, &member.username)?.is_some() {
                error!(username = %member.username, "Username already exists");
                return Err(LendingError::Duplicate(format!(
                    "Username already exists: {}",
                    member.username
                )));
            }
            if db::find_member_by_email(tx, &member.email)?.is_some() {
                error!(email = %member.email, "Email already exists");
                return Err(LendingError::Duplicate(format!("Email already exists: {}", member.email)));
            }
            db::insert_member(tx, &member)
        })?;

        info!(member_id = created.id, "Member created successfully");
        Ok(created)
    }

    /// Replace a member's details. The stored password survives when the
    /// update carries none. Deactivating only blocks future borrowing.
    pub fn update_member(&mut self, id: i64, changes: MemberUpdate) -> LendingResult<Member> {
        info!(member_id = id, "Updating member");
        validate_member(&changes.name, &changes.email, &changes.username, &changes.membership_type)?;

        let updated = self.transact("update_member", |tx, _| {
            let mut member = db::fetch_member(tx, id)?;

            if member.username != changes.username
                && db::find_member_by_username(tx, &changes.username)?.is_some()
            {
                error!(username = %changes.username, "Username already exists");
                return Err(LendingError::Duplicate(format!(
                    "Username already exists: {}",
                    changes.username
                )));
            }
            if member.email != changes.email && db::find_member_by_email(tx, &changes.email)?.is_some() {
                error!(email = %changes.email, "Email already exists");
                return Err(LendingError::Duplicate(format!("Email already exists: {}", changes.email)));
            }

            member.name = changes.name.clone();
            member.email = changes.email.clone();
            member.phone = changes.phone.clone();
            member.username = changes.username.clone();
            if let Some(password) = changes.password.as_ref().filter(|p| !p.is_empty()) {
                member.password = password.clone();
            }
            member.membership_type = changes.membership_type.clone();
            member.active = changes.active;

            db::update_member(tx, &member)?;
            Ok(member)
        })?;

        info!(member_id = id, username = %updated.username, "Member updated successfully");
        Ok(updated)
    }

    /// Remove a member who has nothing out on loan. Returned history goes
    /// with them.
    pub fn delete_member(&mut self, id: i64) -> LendingResult<()> {
        info!(member_id = id, "Deleting member");

        let username = self.transact("delete_member", |tx, _| {
            let member = db::fetch_member(tx, id)?;
            let outstanding = db::count_outstanding_loans_for_member(tx, id)?;
            if outstanding > 0 {
                error!(member_id = id, outstanding, "Cannot delete member with outstanding loans");
                return Err(LendingError::InvalidState(format!(
                    "Cannot delete member with {outstanding} outstanding loans"
                )));
            }
            db::delete_member(tx, id)?;
            Ok(member.username)
        })?;

        info!(member_id = id, %username, "Member deleted successfully");
        Ok(())
    }
}
