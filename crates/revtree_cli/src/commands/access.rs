//! Access command implementation.

use revtree_access::{AccessKind, AccessManager, AccessPolicy, AccessValue};
use revtree_core::{Address, Identifier};
use std::path::Path;
use tracing::debug;

/// Runs the access command.
pub fn run(
    policy_path: &Path,
    actor: &str,
    resource: &str,
    access: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = load_policy(policy_path)?;
    let actor: Identifier = actor.parse()?;
    let resource: Address = resource.parse()?;
    let access: AccessKind = access.parse()?;

    let value = manager.has_access(&actor, &resource, &access);
    let subtree = manager.has_access_to_subtree(&actor, &resource, &access);
    let subresource = manager.has_access_to_subresource(&actor, &resource, &access);
    debug!(actor = %actor, resource = %resource, access = %access, value = %value, "evaluated");

    println!("{actor} {access} {resource}: {value}");
    println!("  whole subtree: {}", yes_no(subtree));
    println!("  some subresource: {}", yes_no(subresource));

    if value == AccessValue::Allowed {
        Ok(())
    } else {
        Err(format!("{access} access is {value}").into())
    }
}

/// Reads a policy from a JSON file.
pub fn load_policy(path: &Path) -> Result<AccessManager, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let policy: AccessPolicy = serde_json::from_str(&text)?;
    Ok(AccessManager::from_policy(policy)?)
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revtree_access::{AccessDefinition, Membership};
    use revtree_testkit::prelude::*;

    fn policy() -> AccessPolicy {
        AccessPolicy {
            groups: vec![Membership {
                member: id("alice"),
                group: id("editors"),
            }],
            definitions: vec![
                AccessDefinition {
                    subject: id("editors"),
                    resource: addr(PHONEBOOK),
                    access: AccessKind::Write,
                    allowed: true,
                },
                AccessDefinition {
                    subject: id("all"),
                    resource: addr("/repo"),
                    access: AccessKind::Write,
                    allowed: false,
                },
            ],
        }
    }

    #[test]
    fn allowed_actor_succeeds() {
        let file = JsonFile::write("policy.json", &policy());
        assert!(run(&file.path, "alice", "/repo/phonebook/john", "write").is_ok());
    }

    #[test]
    fn denied_actor_fails() {
        let file = JsonFile::write("policy.json", &policy());
        let err = run(&file.path, "bob", "/repo/phonebook", "write").unwrap_err();
        assert_eq!(err.to_string(), "write access is denied");
        assert!(run(&file.path, "alice", "/repo/phonebook", "read").is_err());
    }

    #[test]
    fn bad_arguments_are_errors() {
        let file = JsonFile::write("policy.json", &policy());
        assert!(run(&file.path, "-bad", "/repo", "write").is_err());
        assert!(run(&file.path, "alice", "repo", "write").is_err());
    }

    #[test]
    fn cyclic_policy_fails_to_load() {
        let mut cyclic = policy();
        cyclic.groups.push(Membership {
            member: id("editors"),
            group: id("alice"),
        });
        let file = JsonFile::write("policy.json", &cyclic);
        assert!(load_policy(&file.path).is_err());
    }
}
