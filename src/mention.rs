//! `@persona` mention routing

use crate::error::{Error, Result};
use crate::types::Persona;
use regex::Regex;
use std::sync::LazyLock;

static LEADING_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^@(\S+)\s+(.+)").expect("static pattern compiles"));

static TRAILING_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\S*)$").expect("static pattern compiles"));

/// A leading `@name question` prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mention<'a> {
    /// Name as typed after `@`
    pub name: &'a str,
    /// Everything after the name
    pub question: &'a str,
}

/// Where a message should go
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Route<'a> {
    /// Whole panel
    Broadcast {
        /// Message text
        content: &'a str,
    },
    /// One persona
    Targeted {
        /// Resolved persona
        persona: &'a Persona,
        /// Question without the mention
        question: &'a str,
    },
}

/// Parse a leading mention; `None` when the input is not `@name question`
pub fn parse_mention(input: &str) -> Option<Mention<'_>> {
    let caps = LEADING_MENTION.captures(input)?;
    Some(Mention {
        name: caps.get(1)?.as_str(),
        question: caps.get(2)?.as_str(),
    })
}

/// Resolve a typed name against the panel; first match wins.
///
/// Matches when the persona name contains the typed name, or the typed name
/// contains the persona's first name. Case-sensitive.
pub fn resolve<'p>(name: &str, personas: &'p [Persona]) -> Option<&'p Persona> {
    personas.iter().find(|persona| {
        let first = persona.first_name();
        persona.name.contains(name) || (!first.is_empty() && name.contains(first))
    })
}

/// Decide broadcast vs targeted for raw input
pub fn route<'a>(input: &'a str, personas: &'a [Persona]) -> Result<Route<'a>> {
    match parse_mention(input) {
        Some(mention) => {
            let persona = resolve(mention.name, personas)
                .ok_or_else(|| Error::PersonaNotFound(mention.name.to_string()))?;
            Ok(Route::Targeted {
                persona,
                question: mention.question,
            })
        }
        None => Ok(Route::Broadcast { content: input }),
    }
}

/// Autocomplete candidates for a mention being typed at the cursor
pub fn suggest<'p>(before_cursor: &str, personas: &'p [Persona]) -> Vec<&'p Persona> {
    let Some(caps) = TRAILING_MENTION.captures(before_cursor) else {
        return Vec::new();
    };
    let query = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
    personas
        .iter()
        .filter(|persona| persona.name.to_lowercase().contains(&query))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> Vec<Persona> {
        vec![
            Persona::new(1, "Marcus Growth", "Growth investor"),
            Persona::new(2, "Elena Value", "Value investor"),
        ]
    }

    #[test]
    fn test_partial_name_routes_to_persona() {
        let personas = panel();
        let route = route("@Mar question", &personas).unwrap();
        assert_eq!(
            route,
            Route::Targeted {
                persona: &personas[0],
                question: "question"
            }
        );
    }

    #[test]
    fn test_typed_name_containing_first_name() {
        let personas = panel();
        assert_eq!(resolve("Elena的看法", &personas), Some(&personas[1]));
        assert_eq!(resolve("elena", &personas), None);
    }

    #[test]
    fn test_unknown_persona() {
        let personas = panel();
        let err = route("@Nobody hi there", &personas).unwrap_err();
        assert!(matches!(err, Error::PersonaNotFound(name) if name == "Nobody"));
    }

    #[test]
    fn test_broadcast_when_no_mention() {
        let personas = panel();
        assert_eq!(
            route("Is NVDA overvalued?", &personas).unwrap(),
            Route::Broadcast {
                content: "Is NVDA overvalued?"
            }
        );
        // a bare mention without a question is broadcast as typed
        assert_eq!(
            route("@Marcus", &personas).unwrap(),
            Route::Broadcast { content: "@Marcus" }
        );
    }

    #[test]
    fn test_multiline_question_kept_whole() {
        let mention = parse_mention("@Elena first line\nsecond line").unwrap();
        assert_eq!(mention.name, "Elena");
        assert_eq!(mention.question, "first line\nsecond line");
    }

    #[test]
    fn test_suggest() {
        let personas = panel();
        let names = |v: Vec<&Persona>| v.into_iter().map(|p| p.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(suggest("ask @el", &personas)), vec!["Elena Value"]);
        assert_eq!(names(suggest("@", &personas)).len(), 2);
        assert!(suggest("@el done", &personas).is_empty());
    }
}
