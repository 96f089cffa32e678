use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Unofficial client library running behind the messenger bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessengerClientVariant {
    /// Use whatever the bridge reports at login; probe the title call if unknown.
    #[default]
    Auto,
    FcaUnofficial,
    Ws3Fca,
}

impl MessengerClientVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::FcaUnofficial => "fca-unofficial",
            Self::Ws3Fca => "ws3-fca",
        }
    }

    /// Argument order this variant is known to accept for `setTitle`.
    pub fn set_title_order(self) -> Option<SetTitleArgumentOrder> {
        match self {
            Self::Auto => None,
            Self::FcaUnofficial => Some(SetTitleArgumentOrder::TitleFirst),
            Self::Ws3Fca => Some(SetTitleArgumentOrder::ThreadFirst),
        }
    }

    /// Lenient parse of the label a bridge reports. Unknown labels map to `Auto`.
    pub fn from_reported(label: Option<&str>) -> Self {
        label
            .and_then(|value| value.parse().ok())
            .unwrap_or(Self::Auto)
    }
}

impl fmt::Display for MessengerClientVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessengerClientVariant {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "auto" => Ok(Self::Auto),
            "fca-unofficial" => Ok(Self::FcaUnofficial),
            "ws3-fca" => Ok(Self::Ws3Fca),
            other => Err(format!("unknown messenger client '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTitleArgumentOrder {
    /// `setTitle(title, threadID)`
    TitleFirst,
    /// `setTitle(threadID, title)`
    ThreadFirst,
}

impl SetTitleArgumentOrder {
    pub fn alternate(self) -> Self {
        match self {
            Self::TitleFirst => Self::ThreadFirst,
            Self::ThreadFirst => Self::TitleFirst,
        }
    }

    pub fn arguments<'a>(self, title: &'a str, thread_id: &'a str) -> [&'a str; 2] {
        match self {
            Self::TitleFirst => [title, thread_id],
            Self::ThreadFirst => [thread_id, title],
        }
    }

    fn encode(self) -> u8 {
        match self {
            Self::TitleFirst => 1,
            Self::ThreadFirst => 2,
        }
    }

    fn decode(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::TitleFirst),
            2 => Some(Self::ThreadFirst),
            _ => None,
        }
    }
}

/// Per-session argument order, resolved at most once and then reused.
#[derive(Debug, Default)]
pub(crate) struct PinnedArgumentOrder(AtomicU8);

impl PinnedArgumentOrder {
    pub(crate) fn new(initial: Option<SetTitleArgumentOrder>) -> Self {
        Self(AtomicU8::new(initial.map_or(0, SetTitleArgumentOrder::encode)))
    }

    pub(crate) fn get(&self) -> Option<SetTitleArgumentOrder> {
        SetTitleArgumentOrder::decode(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn pin(&self, order: SetTitleArgumentOrder) {
        self.0.store(order.encode(), Ordering::Release);
    }
}
