//! Message text embeds.
//!
//! Clients embed references into message text in two forms:
//!
//! - JSON embeds, `!{"type":"user","raw":"@alice","id":"<uuid>"}`
//! - URL embeds, `<origin>/files/<uuid>` and `<origin>/messages/<uuid>`
//!
//! [`MessageParser::parse`] extracts them and renders the plain text that
//! bots receive as `plainText`.

use botcast_sdk::objects::payload::EmbeddedInfo;
use regex::{Captures, Regex};
use serde::Deserialize;
use uuid::Uuid;

const JSON_EMBED_PATTERN: &str = r#"!(\{(?:[ \t\n]*"(?:[^"]|\\.)*"[ \t\n]*:[ \t\n]*"(?:[^"]|\\.)*",)*(?:[ \t\n]*"(?:[^"]|\\.)*"[ \t\n]*:[ \t\n]*"(?:[^"]|\\.)*")\})"#;
const URL_EMBED_SUFFIX: &str =
    r"/(files|messages)/([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})";

pub const ATTACHMENT_PLACEHOLDER: &str = "[file]";
pub const CITATION_PLACEHOLDER: &str = "[message]";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseResult {
    pub plain_text: String,
    pub embedded: Vec<EmbeddedInfo>,
    pub mentions: Vec<Uuid>,
    pub group_mentions: Vec<Uuid>,
    pub channel_links: Vec<Uuid>,
    pub attachments: Vec<Uuid>,
    pub citations: Vec<Uuid>,
}

impl ParseResult {
    /// Plain text with line breaks folded into spaces.
    pub fn one_line(&self) -> String {
        self.plain_text.replace('\n', " ")
    }
}

#[derive(Deserialize)]
struct JsonEmbed {
    #[serde(default)]
    raw: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    id: Uuid,
}

#[derive(Debug, Clone)]
pub struct MessageParser {
    json_embed: Regex,
    url_embed: Regex,
}

impl MessageParser {
    /// `origin` is the public origin of the platform, e.g. `https://q.example.com`.
    pub fn new(origin: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            json_embed: Regex::new(JSON_EMBED_PATTERN)?,
            url_embed: Regex::new(&format!(
                "{}{URL_EMBED_SUFFIX}",
                regex::escape(origin.trim_end_matches('/'))
            ))?,
        })
    }

    pub fn parse(&self, text: &str) -> ParseResult {
        let mut result = ParseResult::default();

        // Malformed or unknown embeds stay verbatim.
        let replaced = self.json_embed.replace_all(text, |caps: &Captures<'_>| {
            let whole = &caps[0];
            let Ok(embed) = serde_json::from_str::<JsonEmbed>(&caps[1]) else {
                return whole.to_string();
            };
            let (ids, rendered) = match embed.kind.as_str() {
                "user" => (&mut result.mentions, embed.raw.clone()),
                "group" => (&mut result.group_mentions, embed.raw.clone()),
                "channel" => (&mut result.channel_links, embed.raw.clone()),
                "file" => (&mut result.attachments, ATTACHMENT_PLACEHOLDER.to_string()),
                "message" => (&mut result.citations, CITATION_PLACEHOLDER.to_string()),
                _ => return whole.to_string(),
            };
            ids.push(embed.id);
            result.embedded.push(EmbeddedInfo {
                raw: embed.raw,
                kind: embed.kind,
                id: embed.id,
            });
            rendered
        });

        let replaced = self.url_embed.replace_all(&replaced, |caps: &Captures<'_>| {
            let Ok(id) = Uuid::parse_str(&caps[2]) else {
                return caps[0].to_string();
            };
            let (ids, kind, rendered) = match &caps[1] {
                "files" => (&mut result.attachments, "file", ATTACHMENT_PLACEHOLDER),
                _ => (&mut result.citations, "message", CITATION_PLACEHOLDER),
            };
            ids.push(id);
            result.embedded.push(EmbeddedInfo {
                raw: caps[0].to_string(),
                kind: kind.to_string(),
                id,
            });
            rendered.to_string()
        });

        result.plain_text = replaced.into_owned();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const U1: &str = "ee764d5f-71d9-4a40-bc7b-547d8d097c91";
    const U2: &str = "0f1f6d9e-fb5b-4209-8a6d-33a098e79691";

    fn parser() -> MessageParser {
        MessageParser::new("http://localhost:3000").unwrap()
    }

    fn id(s: &str) -> Uuid {
        Uuid::parse_str(s).unwrap()
    }

    #[test]
    fn text_without_embeds_is_untouched() {
        for text in [
            "test message !{aaa",
            r#"{"test": "test"}!!{}"#,
            "!{aiueo::::aaaaaaa}",
            r#"test message !{"test": "test"}"#,
        ] {
            let result = parser().parse(text);
            assert_eq!(result.plain_text, text);
            assert!(result.embedded.is_empty());
        }
    }

    #[test]
    fn user_mention() {
        let text = format!(r#"test message !{{"raw": "@test","type":"user","id":"{U1}"}}"#);
        let result = parser().parse(&text);
        assert_eq!(result.plain_text, "test message @test");
        assert_eq!(result.mentions, vec![id(U1)]);
        assert_eq!(
            result.embedded,
            vec![EmbeddedInfo {
                raw: "@test".to_string(),
                kind: "user".to_string(),
                id: id(U1),
            }]
        );
    }

    #[test]
    fn mixed_embeds() {
        let text = format!(
            r#"!{{"raw": "","type":"file","id":"{U1}"}}test message !{{"raw": "@test","type":"user","id":"{U2}"}}!{{"raw": "","type":"message","id":"{U1}"}}"#
        );
        let result = parser().parse(&text);
        assert_eq!(result.plain_text, "[file]test message @test[message]");
        assert_eq!(result.attachments, vec![id(U1)]);
        assert_eq!(result.mentions, vec![id(U2)]);
        assert_eq!(result.citations, vec![id(U1)]);
        assert_eq!(result.embedded.len(), 3);
    }

    #[test]
    fn group_and_channel() {
        let text = format!(r#"!{{ test message !{{"raw": "@test","type":"group","id":"{U1}"}}"#);
        let result = parser().parse(&text);
        assert_eq!(result.plain_text, "!{ test message @test");
        assert_eq!(result.group_mentions, vec![id(U1)]);

        let text = format!(r##"!{{ test message !{{"raw": "#a/e","type":"channel","id":"{U1}"}}"##);
        let result = parser().parse(&text);
        assert_eq!(result.plain_text, "!{ test message #a/e");
        assert_eq!(result.channel_links, vec![id(U1)]);
    }

    #[test]
    fn malformed_json_embeds_stay_verbatim() {
        for text in [
            r#"!{ test message !{"raw": 1,"type":"user","id":"test_id"}"#,
            r#"!{ test message !{"raw": "1","type":"user","id":"test_id"}"#,
        ] {
            let result = parser().parse(text);
            assert_eq!(result.plain_text, text);
            assert!(result.mentions.is_empty());
        }
    }

    #[test]
    fn url_embeds() {
        let text = format!(
            "http://localhost:3000/messages/{U2} test message http://localhost:3000/files/{U1} http://localhost:3000/fiales/{U1}"
        );
        let result = parser().parse(&text);
        assert_eq!(
            result.plain_text,
            format!("[message] test message [file] http://localhost:3000/fiales/{U1}")
        );
        assert_eq!(result.attachments, vec![id(U1)]);
        assert_eq!(result.citations, vec![id(U2)]);
    }

    #[test]
    fn url_embeds_only_match_the_configured_origin() {
        let text = format!("https://other.example/files/{U1}");
        let result = parser().parse(&text);
        assert_eq!(result.plain_text, text);
        assert!(result.attachments.is_empty());
    }

    #[test]
    fn unknown_type_keeps_json_but_url_still_matches() {
        let text = format!(
            r#"!{{"raw": "1","type":"","id":"{U1}"}} http://localhost:3000/files/{U1}"#
        );
        let result = parser().parse(&text);
        assert_eq!(
            result.plain_text,
            format!(r#"!{{"raw": "1","type":"","id":"{U1}"}} [file]"#)
        );
        assert_eq!(result.attachments, vec![id(U1)]);
    }

    #[test]
    fn one_line() {
        let result = parser().parse("a\nb");
        assert_eq!(result.one_line(), "a b");
    }
}
