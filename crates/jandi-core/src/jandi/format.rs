//! Plain-text rendering of API data for tool output.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::jandi::lookup::DmMatch;
use crate::jandi::models::{Attachment, Comment, MessageRecord, RoomDirectory, TextContent};

/// Characters of the last message shown next to a direct message room.
const PREVIEW_CHARS: usize = 50;

/// Render the room directory as three titled sections.
///
/// Sections without rooms are left out. Returns an empty string for an
/// empty directory.
#[must_use]
pub fn format_rooms(rooms: &RoomDirectory) -> String {
    let mut out = String::new();

    if !rooms.topics.is_empty() {
        let _ = writeln!(out, "=== Channels/Topics ({}) ===", rooms.topics.len());
        for topic in &rooms.topics {
            let _ = write!(
                out,
                "- {} (ID: {})",
                topic.name.as_deref().unwrap_or("(unnamed)"),
                topic.id
            );
            if let Some(kind) = topic.kind.as_deref().filter(|k| !k.is_empty()) {
                let _ = write!(out, " [{kind}]");
            }
            out.push('\n');
        }
        out.push('\n');
    }

    if !rooms.chats.is_empty() {
        let _ = writeln!(out, "=== 1:1 DMs ({}) ===", rooms.chats.len());
        for chat in &rooms.chats {
            let companion = chat
                .companion_id
                .as_ref()
                .map_or_else(|| "unknown".to_string(), ToString::to_string);
            let _ = write!(out, "- DM with user {companion} (Room ID: {})", chat.id);
            if let Some(text) = chat
                .last_message
                .as_ref()
                .and_then(|m| m.text.as_deref())
                .filter(|t| !t.is_empty())
            {
                let _ = write!(out, " - \"{}\"", preview(text));
            }
            out.push('\n');
        }
        out.push('\n');
    }

    if !rooms.group_chats.is_empty() {
        let _ = writeln!(out, "=== Group DMs ({}) ===", rooms.group_chats.len());
        for group in &rooms.group_chats {
            let members = group.members.as_ref().map_or(0, Vec::len);
            let _ = writeln!(
                out,
                "- {} (Room ID: {}, {members} members)",
                group.name.as_deref().unwrap_or("Group DM"),
                group.id
            );
        }
        out.push('\n');
    }

    out.trim_end().to_string()
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Label of a message entry.
///
/// Comments reference their parent; everything else shows its kind, id and
/// comment count.
#[must_use]
pub fn message_label(record: &MessageRecord) -> String {
    if let Some(parent) = record.parent_id() {
        return format!("comment on #{parent}");
    }

    let kind = match record.content_type() {
        Some("text") | None => "message",
        Some(other) => other,
    };
    let id = record
        .id()
        .map_or_else(|| "?".to_string(), ToString::to_string);

    let mut label = format!("{kind} #{id}");
    if let Some(count) = record
        .message
        .as_ref()
        .and_then(|m| m.comment_count)
        .filter(|n| *n > 0)
    {
        let _ = write!(label, " ({count} comments)");
    }
    label
}

/// Render one message with its attachments.
#[must_use]
pub fn format_message(record: &MessageRecord) -> String {
    let body = record.message.as_ref();
    let mut out = format!(
        "[{}] [{}] User {}: {}",
        message_label(record),
        format_time(body.and_then(|m| m.created_at.as_ref())),
        writer(record.writer()),
        text(body.and_then(|m| m.content.as_ref()))
    );

    for attachment in record.attachments() {
        out.push('\n');
        out.push_str(&format_attachment(attachment));
    }
    out
}

fn format_attachment(attachment: &Attachment) -> String {
    let name = attachment.display_name().unwrap_or("(untitled)");
    if attachment.is_image() {
        format!(
            "  [image] {name}: {}",
            attachment.preview_url().unwrap_or("(no preview)")
        )
    } else {
        format!(
            "  [file] {name}: {}",
            attachment.file_url().unwrap_or("(no link)")
        )
    }
}

/// Render a list of messages, one block per message.
#[must_use]
pub fn format_messages(records: &[MessageRecord]) -> String {
    if records.is_empty() {
        return "No messages in this room.".to_string();
    }
    records
        .iter()
        .map(format_message)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render one comment.
#[must_use]
pub fn format_comment(comment: &Comment) -> String {
    format!(
        "[{}] User {}: {}",
        format_time(comment.created_at.as_ref()),
        writer(comment.writer_id.as_ref()),
        text(comment.content.as_ref())
    )
}

/// Render a list of comments, one per line.
#[must_use]
pub fn format_comments(comments: &[Comment]) -> String {
    if comments.is_empty() {
        return "No comments on this post.".to_string();
    }
    comments
        .iter()
        .map(format_comment)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the members found by a name search.
#[must_use]
pub fn format_dm_matches(query: &str, matches: &[DmMatch<'_>]) -> String {
    if matches.is_empty() {
        return format!("No members matching \"{query}\".");
    }

    let mut out = format!("Members matching \"{query}\" ({}):\n", matches.len());
    for found in matches {
        let member = found.member;
        let profile = member.profile.as_ref();

        out.push('\n');
        let _ = write!(out, "{}", member.name.as_deref().unwrap_or("(unnamed)"));
        if let Some(position) = profile
            .and_then(|p| p.position.as_deref())
            .filter(|p| !p.is_empty())
        {
            let _ = write!(out, " ({position})");
        }
        out.push('\n');
        let _ = writeln!(
            out,
            "  Email: {}",
            profile.and_then(|p| p.email.as_deref()).unwrap_or("-")
        );
        let _ = writeln!(
            out,
            "  Department: {}",
            profile.and_then(|p| p.department.as_deref()).unwrap_or("-")
        );
        let _ = writeln!(out, "  Member ID: {}", member.id);
        match found.dm {
            Some(chat) => {
                let _ = writeln!(out, "  DM Room ID: {}", chat.id);
            }
            None => out.push_str("  DM Room ID: none\n"),
        }
    }
    out.trim_end().to_string()
}

/// URLs of the images worth showing inline, one per image attachment.
#[must_use]
pub fn image_urls(records: &[MessageRecord]) -> Vec<String> {
    records
        .iter()
        .flat_map(MessageRecord::attachments)
        .filter(|a| a.is_image())
        .filter_map(Attachment::preview_url)
        .map(str::to_string)
        .collect()
}

/// Pretty-printed JSON for payloads with an unknown shape.
#[must_use]
pub fn raw_response(raw: &Value) -> String {
    let json = serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string());
    format!("Raw response: {json}")
}

fn writer(id: Option<&impl ToString>) -> String {
    id.map_or_else(|| "unknown".to_string(), ToString::to_string)
}

fn text(content: Option<&TextContent>) -> &str {
    content
        .and_then(|c| c.body.as_deref().or(c.text.as_deref()))
        .unwrap_or("")
}

/// Render a server timestamp in UTC.
///
/// The API sends either ISO 8601 strings or epoch milliseconds.
fn format_time(value: Option<&Value>) -> String {
    let parsed = match value {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .ok(),
        Some(Value::Number(n)) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    };

    match (parsed, value) {
        (Some(time), _) => time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        (None, Some(Value::String(s))) => s.clone(),
        (None, _) => "unknown time".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jandi::lookup::find_dm_by_name;
    use crate::jandi::models::{COMMENT_KEYS, MESSAGE_KEYS, Member, Payload, parse_list};
    use serde_json::json;

    fn records(raw: Value) -> Vec<MessageRecord> {
        match parse_list(raw, MESSAGE_KEYS) {
            Payload::Recognized(records) => records,
            Payload::Unrecognized(raw) => panic!("unrecognized: {raw}"),
        }
    }

    fn rooms(raw: Value) -> RoomDirectory {
        match RoomDirectory::parse(raw) {
            Payload::Recognized(rooms) => rooms,
            Payload::Unrecognized(raw) => panic!("unrecognized: {raw}"),
        }
    }

    #[test]
    fn comment_entries_reference_their_parent() {
        let records = records(json!([{
            "messageId": 11,
            "feedbackId": 7,
            "message": {
                "writerId": 3,
                "contentType": "comment",
                "content": { "body": "agreed" },
                "createdAt": "2024-05-01T09:30:00.000Z"
            }
        }]));

        assert_eq!(
            format_message(&records[0]),
            "[comment on #7] [2024-05-01 09:30:00 UTC] User 3: agreed"
        );
    }

    #[test]
    fn labels_use_kind_and_comment_count() {
        let records = records(json!([
            { "messageId": 1, "feedbackId": -1, "message": { "contentType": "text", "commentCount": 2 } },
            { "messageId": 2, "message": { "contentType": "sticker" } },
            { "messageId": 3, "message": { "contentType": "announcement" } }
        ]));

        assert_eq!(message_label(&records[0]), "message #1 (2 comments)");
        assert_eq!(message_label(&records[1]), "sticker #2");
        assert_eq!(message_label(&records[2]), "announcement #3");
    }

    #[test]
    fn attachments_are_listed_under_the_message() {
        let records = records(json!({ "records": [{
            "messageId": 5,
            "message": {
                "writerId": 9,
                "contentType": "file",
                "content": { "text": "see attached" },
                "createdAt": 1_714_555_800_000_i64,
                "attachments": [
                    { "content": {
                        "title": "diagram.png",
                        "type": "image/png",
                        "fileUrl": "https://files.example/diagram.png",
                        "extraInfo": { "largeThumbnailUrl": "https://files.example/diagram-large.png" }
                    }},
                    { "content": {
                        "name": "notes.pdf",
                        "type": "application/pdf",
                        "fileUrl": "https://files.example/notes.pdf"
                    }}
                ]
            }
        }]}));

        let text = format_message(&records[0]);
        assert!(text.starts_with("[file #5] [2024-05-01 09:30:00 UTC] User 9: see attached"));
        assert!(text.contains("  [image] diagram.png: https://files.example/diagram-large.png"));
        assert!(text.contains("  [file] notes.pdf: https://files.example/notes.pdf"));

        assert_eq!(
            image_urls(&records),
            vec!["https://files.example/diagram-large.png".to_string()]
        );
    }

    #[test]
    fn empty_lists_have_a_message() {
        assert_eq!(format_messages(&[]), "No messages in this room.");
        assert_eq!(format_comments(&[]), "No comments on this post.");
    }

    #[test]
    fn comments_render_one_per_line() {
        let raw = json!({ "comments": [
            { "id": 1, "writerId": 4, "content": { "body": "first" }, "createdAt": "2024-05-01T00:00:00Z" },
            { "id": 2, "writerId": 5, "content": { "body": "second" } }
        ]});
        let Payload::Recognized(comments) = parse_list::<Comment>(raw, COMMENT_KEYS) else {
            panic!("comments not recognized");
        };

        assert_eq!(
            format_comments(&comments),
            "[2024-05-01 00:00:00 UTC] User 4: first\n[unknown time] User 5: second"
        );
    }

    #[test]
    fn rooms_are_grouped_into_sections() {
        let long = "x".repeat(80);
        let rooms = rooms(json!({
            "topics": [{ "id": 100, "name": "general", "type": "public" }],
            "chats": [{ "id": 200, "companionId": 42, "lastMessage": { "text": long } }],
            "groupChats": [{ "id": 300, "name": "ops", "members": [1, 2, 3] }]
        }));

        let text = format_rooms(&rooms);
        assert!(text.contains("=== Channels/Topics (1) ===\n- general (ID: 100) [public]"));
        assert!(text.contains(&format!(
            "=== 1:1 DMs (1) ===\n- DM with user 42 (Room ID: 200) - \"{}...\"",
            "x".repeat(50)
        )));
        assert!(text.contains("=== Group DMs (1) ===\n- ops (Room ID: 300, 3 members)"));
    }

    #[test]
    fn empty_directory_renders_nothing() {
        assert_eq!(format_rooms(&RoomDirectory::default()), "");
    }

    #[test]
    fn dm_matches_show_profile_and_room() {
        let members: Vec<Member> = serde_json::from_value(json!([
            { "id": 42, "name": "Kim Minsu", "profile": {
                "email": "minsu@example.com", "department": "Platform", "position": "Engineer"
            }},
            { "id": 43, "name": "Kim Jiwoo" }
        ]))
        .expect("members");
        let rooms = rooms(json!({ "chats": [{ "id": 200, "companionId": 42 }] }));

        let matches = find_dm_by_name(&members, Some(&rooms), "kim");
        let text = format_dm_matches("kim", &matches);

        assert!(text.starts_with("Members matching \"kim\" (2):"));
        assert!(text.contains(
            "Kim Minsu (Engineer)\n  Email: minsu@example.com\n  Department: Platform\n  Member ID: 42\n  DM Room ID: 200"
        ));
        assert!(text.contains(
            "Kim Jiwoo\n  Email: -\n  Department: -\n  Member ID: 43\n  DM Room ID: none"
        ));
    }

    #[test]
    fn no_dm_matches() {
        assert_eq!(format_dm_matches("zed", &[]), "No members matching \"zed\".");
    }

    #[test]
    fn raw_response_is_pretty_json() {
        assert_eq!(
            raw_response(&json!({ "a": 1 })),
            "Raw response: {\n  \"a\": 1\n}"
        );
    }
}
