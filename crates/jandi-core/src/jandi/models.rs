//! Data models for the Jandi API.
//!
//! List endpoints do not agree on a single envelope: the same logical list
//! shows up as `messages` on one server version and `records` on another.
//! Parsers here try the known keys in order and hand back the raw payload as
//! [`Payload::Unrecognized`] when none of them match.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys that may hold the message list, in lookup order.
pub const MESSAGE_KEYS: &[&str] = &["messages", "records"];
/// Keys that may hold the comment list, in lookup order.
pub const COMMENT_KEYS: &[&str] = &["comments", "records"];
/// Keys that may hold the member list, in lookup order.
pub const MEMBER_KEYS: &[&str] = &["members", "records"];
/// Keys that may hold the topic (channel) list, in lookup order.
pub const TOPIC_KEYS: &[&str] = &["topics", "channels", "rooms"];

/// Body of the token exchange request.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TokenRequest<'a> {
    /// Long-lived refresh token.
    pub refresh_token: &'a str,
    /// Always `refresh_token`.
    pub grant_type: &'static str,
    /// Always `web`.
    pub platform: &'static str,
}

impl<'a> TokenRequest<'a> {
    /// Refresh-token grant for the web platform.
    #[must_use]
    pub const fn refresh(refresh_token: &'a str) -> Self {
        Self {
            refresh_token,
            grant_type: "refresh_token",
            platform: "web",
        }
    }
}

/// Response of the token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Short-lived bearer token.
    pub access_token: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
}

/// Response of `/account-api/v1/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct MeResponse {
    /// Account UUID.
    pub uuid: String,
    /// Team memberships of the account.
    #[serde(default)]
    pub memberships: Vec<Membership>,
}

/// One team membership.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    /// Team id.
    pub team_id: EntityId,
    /// Member id within the team.
    pub member_id: EntityId,
}

/// An identifier the server sends either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Numeric id.
    Number(i64),
    /// String id.
    Text(String),
}

impl EntityId {
    /// Numeric value, parsing string ids when they hold a number.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A parsed response, or the raw payload when its shape is unknown.
#[derive(Debug, Clone)]
pub enum Payload<T> {
    /// The payload matched a known shape.
    Recognized(T),
    /// None of the known shapes matched.
    Unrecognized(Value),
}

impl<T> Payload<T> {
    /// The parsed value, if the shape was recognized.
    #[must_use]
    pub const fn recognized(&self) -> Option<&T> {
        match self {
            Self::Recognized(value) => Some(value),
            Self::Unrecognized(_) => None,
        }
    }
}

/// Parse a list that may sit under any of `keys`, or be the payload itself.
///
/// Entries that fail to decode are skipped.
#[must_use]
pub fn parse_list<T: DeserializeOwned>(raw: Value, keys: &[&str]) -> Payload<Vec<T>> {
    match find_list(&raw, keys).map(|items| decode_items(items)) {
        Some(items) => Payload::Recognized(items),
        None => Payload::Unrecognized(raw),
    }
}

fn find_list<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a [Value]> {
    match raw {
        Value::Array(items) => Some(items),
        Value::Object(map) => keys
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice),
        _ => None,
    }
}

fn decode_items<T: DeserializeOwned>(items: &[Value]) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                log::warn!("skipping undecodable entry: {e}");
                None
            }
        })
        .collect()
}

// ─── Rooms ───────────────────────────────────────────────────────────

/// Rooms visible to the member, grouped by kind.
#[derive(Debug, Clone, Default)]
pub struct RoomDirectory {
    /// Public and private topics (channels).
    pub topics: Vec<Topic>,
    /// One-to-one direct message rooms.
    pub chats: Vec<DirectChat>,
    /// Group direct message rooms.
    pub group_chats: Vec<GroupChat>,
}

impl RoomDirectory {
    /// Parse the `/start-api/v4/teams/{teamId}/rooms` payload.
    #[must_use]
    pub fn parse(raw: Value) -> Payload<Self> {
        let Some(map) = raw.as_object() else {
            return Payload::Unrecognized(raw);
        };

        let topics = TOPIC_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array));
        let chats = map.get("chats").and_then(Value::as_array);
        let group_chats = map.get("groupChats").and_then(Value::as_array);

        if topics.is_none() && chats.is_none() && group_chats.is_none() {
            return Payload::Unrecognized(raw);
        }

        Payload::Recognized(Self {
            topics: topics.map(|items| decode_items(items)).unwrap_or_default(),
            chats: chats.map(|items| decode_items(items)).unwrap_or_default(),
            group_chats: group_chats
                .map(|items| decode_items(items))
                .unwrap_or_default(),
        })
    }

    /// Whether no room of any kind is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.chats.is_empty() && self.group_chats.is_empty()
    }

    /// The direct message room shared with `member_id`, if any.
    #[must_use]
    pub fn dm_with(&self, member_id: &EntityId) -> Option<&DirectChat> {
        self.chats
            .iter()
            .find(|chat| chat.companion_id.as_ref() == Some(member_id))
    }
}

/// A topic (channel).
#[derive(Debug, Clone, Deserialize)]
pub struct Topic {
    /// Room id.
    pub id: EntityId,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Topic type as reported by the server.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// A one-to-one direct message room.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectChat {
    /// Room id.
    pub id: EntityId,
    /// Member id of the other participant.
    #[serde(default)]
    pub companion_id: Option<EntityId>,
    /// Preview of the latest message.
    #[serde(default)]
    pub last_message: Option<LastMessage>,
}

/// Latest message preview of a chat.
#[derive(Debug, Clone, Deserialize)]
pub struct LastMessage {
    /// Preview text.
    #[serde(default)]
    pub text: Option<String>,
}

/// A group direct message room.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupChat {
    /// Room id.
    pub id: EntityId,
    /// Display name, if one was set.
    #[serde(default)]
    pub name: Option<String>,
    /// Participants.
    #[serde(default)]
    pub members: Option<Vec<Value>>,
}

// ─── Messages ────────────────────────────────────────────────────────

/// One entry of a room's message list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Message id.
    #[serde(default)]
    pub message_id: Option<EntityId>,
    /// Id of the message this entry comments on (positive for comments).
    #[serde(default)]
    pub feedback_id: Option<EntityId>,
    /// Sender entity id.
    #[serde(default)]
    pub from_entity: Option<EntityId>,
    /// Content type (`text`, `sticker`, `file`, `poll`, ...).
    #[serde(default)]
    pub content_type: Option<String>,
    /// The message body.
    #[serde(default)]
    pub message: Option<MessageBody>,
}

impl MessageRecord {
    /// Message id, from the envelope or the body.
    #[must_use]
    pub fn id(&self) -> Option<&EntityId> {
        self.message_id
            .as_ref()
            .or_else(|| self.message.as_ref().and_then(|m| m.id.as_ref()))
    }

    /// Id of the parent message when this entry is a comment.
    #[must_use]
    pub fn parent_id(&self) -> Option<i64> {
        self.feedback_id
            .as_ref()
            .or_else(|| self.message.as_ref().and_then(|m| m.feedback_id.as_ref()))
            .and_then(EntityId::as_i64)
            .filter(|id| *id > 0)
    }

    /// Content type, from the body or the envelope.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(|m| m.content_type.as_deref())
            .or(self.content_type.as_deref())
    }

    /// Writer id, from the body or the envelope.
    #[must_use]
    pub fn writer(&self) -> Option<&EntityId> {
        self.message
            .as_ref()
            .and_then(|m| m.writer_id.as_ref())
            .or(self.from_entity.as_ref())
    }

    /// Attachments of the message.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        self.message
            .as_ref()
            .and_then(|m| m.attachments.as_deref())
            .unwrap_or_default()
    }
}

/// Body of a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    /// Message id.
    #[serde(default)]
    pub id: Option<EntityId>,
    /// Writer member id.
    #[serde(default)]
    pub writer_id: Option<EntityId>,
    /// Text content.
    #[serde(default)]
    pub content: Option<TextContent>,
    /// Creation time as sent by the server.
    #[serde(default)]
    pub created_at: Option<Value>,
    /// Content type.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Parent message id for comments.
    #[serde(default)]
    pub feedback_id: Option<EntityId>,
    /// Number of comments on this message.
    #[serde(default)]
    pub comment_count: Option<u64>,
    /// Attached files and images.
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
}

/// Text content of a message or comment.
#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    /// Rendered body.
    #[serde(default)]
    pub body: Option<String>,
    /// Plain text variant.
    #[serde(default)]
    pub text: Option<String>,
}

/// A file attached to a message.
#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    /// Attachment details.
    #[serde(default)]
    pub content: Option<AttachmentContent>,
}

/// Details of an attached file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentContent {
    /// Title shown in the client.
    #[serde(default)]
    pub title: Option<String>,
    /// File name.
    #[serde(default)]
    pub name: Option<String>,
    /// MIME type.
    #[serde(default, rename = "type")]
    pub mime_type: Option<String>,
    /// Download URL.
    #[serde(default)]
    pub file_url: Option<String>,
    /// Thumbnail URLs.
    #[serde(default)]
    pub extra_info: Option<ExtraInfo>,
}

/// Thumbnail URLs of an attachment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraInfo {
    /// Large thumbnail.
    #[serde(default)]
    pub large_thumbnail_url: Option<String>,
    /// Small thumbnail.
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl Attachment {
    /// Whether the attachment is an image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.content
            .as_ref()
            .and_then(|c| c.mime_type.as_deref())
            .is_some_and(|mime| mime.starts_with("image/"))
    }

    /// Display name of the attachment.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.content
            .as_ref()
            .and_then(|c| c.title.as_deref().or(c.name.as_deref()))
    }

    /// Download URL of the original file.
    #[must_use]
    pub fn file_url(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.file_url.as_deref())
    }

    /// Best URL for showing the attachment inline.
    ///
    /// Thumbnails come first; the original file URL does not always accept
    /// the session's credentials.
    #[must_use]
    pub fn preview_url(&self) -> Option<&str> {
        let content = self.content.as_ref()?;
        content
            .extra_info
            .as_ref()
            .and_then(|info| {
                info.large_thumbnail_url
                    .as_deref()
                    .or(info.thumbnail_url.as_deref())
            })
            .filter(|url| !url.is_empty())
            .or(content.file_url.as_deref())
            .filter(|url| !url.is_empty())
    }
}

// ─── Comments ────────────────────────────────────────────────────────

/// A comment on a post.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Comment id.
    #[serde(default)]
    pub id: Option<EntityId>,
    /// Writer member id.
    #[serde(default)]
    pub writer_id: Option<EntityId>,
    /// Text content.
    #[serde(default)]
    pub content: Option<TextContent>,
    /// Creation time as sent by the server.
    #[serde(default)]
    pub created_at: Option<Value>,
}

// ─── Members ─────────────────────────────────────────────────────────

/// A team member.
#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    /// Member id.
    pub id: EntityId,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Profile details.
    #[serde(default)]
    pub profile: Option<Profile>,
}

/// Profile details of a member.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Department.
    #[serde(default)]
    pub department: Option<String>,
    /// Job position.
    #[serde(default)]
    pub position: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_fall_back_to_records() {
        let raw = json!({ "records": [{ "messageId": 7, "message": { "writerId": 3 } }] });
        let parsed: Payload<Vec<MessageRecord>> = parse_list(raw, MESSAGE_KEYS);

        let records = parsed.recognized().expect("recognized");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), Some(&EntityId::Number(7)));
        assert_eq!(records[0].writer(), Some(&EntityId::Number(3)));
    }

    #[test]
    fn first_matching_key_wins() {
        let raw = json!({
            "comments": [{ "id": 1 }],
            "records": [{ "id": 2 }, { "id": 3 }],
        });
        let parsed: Payload<Vec<Comment>> = parse_list(raw, COMMENT_KEYS);
        assert_eq!(parsed.recognized().map(Vec::len), Some(1));
    }

    #[test]
    fn unknown_shape_keeps_raw_payload() {
        let raw = json!({ "items": [] });
        let parsed: Payload<Vec<Comment>> = parse_list(raw.clone(), COMMENT_KEYS);
        assert!(matches!(parsed, Payload::Unrecognized(ref value) if *value == raw));
    }

    #[test]
    fn bare_array_is_a_member_list() {
        let raw = json!([{ "id": 1, "name": "Kim" }, { "id": "2", "name": "Lee" }]);
        let parsed: Payload<Vec<Member>> = parse_list(raw, MEMBER_KEYS);
        let members = parsed.recognized().expect("recognized");
        assert_eq!(members[1].id, EntityId::Text("2".to_string()));
    }

    #[test]
    fn undecodable_entries_are_skipped() {
        let raw = json!({ "members": [{ "name": "no id" }, { "id": 5 }] });
        let parsed: Payload<Vec<Member>> = parse_list(raw, MEMBER_KEYS);
        assert_eq!(parsed.recognized().map(Vec::len), Some(1));
    }

    #[test]
    fn rooms_group_by_kind() {
        let raw = json!({
            "channels": [{ "id": 1, "name": "general", "type": "topic" }],
            "chats": [{ "id": 2, "companionId": 30, "lastMessage": { "text": "hi" } }],
            "groupChats": [{ "id": 3, "members": [1, 2, 3] }],
        });

        let Payload::Recognized(rooms) = RoomDirectory::parse(raw) else {
            panic!("rooms not recognized");
        };
        assert_eq!(rooms.topics[0].name.as_deref(), Some("general"));
        assert_eq!(rooms.dm_with(&EntityId::Number(30)).map(|c| &c.id), Some(&EntityId::Number(2)));
        assert_eq!(rooms.group_chats[0].members.as_ref().map(Vec::len), Some(3));
    }

    #[test]
    fn rooms_without_known_keys_are_unrecognized() {
        assert!(matches!(
            RoomDirectory::parse(json!({ "something": [] })),
            Payload::Unrecognized(_)
        ));
        assert!(matches!(RoomDirectory::parse(json!([])), Payload::Unrecognized(_)));
    }

    #[test]
    fn comment_detection_needs_positive_feedback_id() {
        let original: MessageRecord =
            serde_json::from_value(json!({ "feedbackId": -1, "messageId": 1 })).expect("decode");
        let comment: MessageRecord =
            serde_json::from_value(json!({ "message": { "feedbackId": "12" } })).expect("decode");

        assert_eq!(original.parent_id(), None);
        assert_eq!(comment.parent_id(), Some(12));
    }

    #[test]
    fn preview_prefers_thumbnails() {
        let attachment: Attachment = serde_json::from_value(json!({
            "content": {
                "type": "image/png",
                "fileUrl": "https://files/original.png",
                "extraInfo": { "thumbnailUrl": "https://files/thumb.png" }
            }
        }))
        .expect("decode");

        assert!(attachment.is_image());
        assert_eq!(attachment.preview_url(), Some("https://files/thumb.png"));
    }
}
