//! Finding direct message rooms by member name.

use crate::jandi::models::{DirectChat, Member, RoomDirectory};

/// A member whose name matched, with the DM room shared with them.
#[derive(Debug, Clone, Copy)]
pub struct DmMatch<'a> {
    /// The matching member.
    pub member: &'a Member,
    /// The one-to-one room with that member, if one exists.
    pub dm: Option<&'a DirectChat>,
}

/// Members whose name contains `query`, ignoring case, in team order.
///
/// `rooms` is `None` when the room list could not be parsed; matches are
/// still reported, without rooms.
#[must_use]
pub fn find_dm_by_name<'a>(
    members: &'a [Member],
    rooms: Option<&'a RoomDirectory>,
    query: &str,
) -> Vec<DmMatch<'a>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    members
        .iter()
        .filter(|member| {
            member
                .name
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains(&needle))
        })
        .map(|member| DmMatch {
            member,
            dm: rooms.and_then(|rooms| rooms.dm_with(&member.id)),
        })
        .collect()
}
