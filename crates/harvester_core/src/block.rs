use std::fmt;

/// Challenge phrases served by bot walls instead of content.
pub const DEFAULT_CHALLENGE_PHRASES: &[&str] = &[
    "verify you are human",
    "verify that you are human",
    "are you a robot",
    "unusual activity",
    "unusual traffic",
    "please enable javascript",
    "enable javascript and cookies",
    "javascript is disabled",
    "checking your browser",
    "request unsuccessful. incapsula",
    "access to this page has been denied",
    "comprueba que eres humano",
    "actividad inusual",
];

/// Documents shorter than this that talk about both javascript and the
/// browser are treated as challenge interstitials.
pub const DEFAULT_SHORT_DOCUMENT_FLOOR: usize = 4_096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// A known challenge phrase matched the visible text.
    Phrase(String),
    /// A short page mentioning javascript and browser.
    ShortChallengePage { bytes: usize },
    /// The server refused the session outright.
    HttpStatus(u16),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Phrase(phrase) => write!(f, "challenge phrase \"{phrase}\""),
            BlockReason::ShortChallengePage { bytes } => {
                write!(f, "short challenge page ({bytes} bytes)")
            }
            BlockReason::HttpStatus(code) => write!(f, "http status {code}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    Blocked { reason: BlockReason },
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Blocked { .. })
    }
}

/// Classifies fetched documents as content or bot-check pages.
#[derive(Debug, Clone)]
pub struct BlockDetector {
    phrases: Vec<String>,
    short_document_floor: usize,
}

impl BlockDetector {
    pub fn new(phrases: impl IntoIterator<Item = impl Into<String>>, floor: usize) -> Self {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            short_document_floor: floor,
        }
    }

    /// `body` is the raw document, `visible_text` its rendered text content.
    pub fn classify(&self, body: &str, visible_text: &str) -> Verdict {
        let text = visible_text.to_lowercase();
        if let Some(phrase) = self.phrases.iter().find(|p| text.contains(p.as_str())) {
            return Verdict::Blocked {
                reason: BlockReason::Phrase(phrase.clone()),
            };
        }

        if body.len() < self.short_document_floor {
            let lower = body.to_lowercase();
            if lower.contains("javascript") && lower.contains("browser") {
                return Verdict::Blocked {
                    reason: BlockReason::ShortChallengePage { bytes: body.len() },
                };
            }
        }

        Verdict::Ok
    }
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::new(
            DEFAULT_CHALLENGE_PHRASES.iter().copied(),
            DEFAULT_SHORT_DOCUMENT_FLOOR,
        )
    }
}
