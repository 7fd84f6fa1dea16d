//! Service URI helpers (`svc:<kind>:<id>` locators).

use crate::backends::{AlbumType, ImageId, LinkKind};

/// URI scheme handled by the bridge.
pub const SCHEME: &str = "svc";

/// Section of an artist's discography selected by a URI fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumSection {
    Albums,
    Singles,
    Compilations,
}

impl AlbumSection {
    pub const ALL: [AlbumSection; 3] = [Self::Albums, Self::Singles, Self::Compilations];

    pub fn fragment(&self) -> &'static str {
        match self {
            Self::Albums => "albums",
            Self::Singles => "singles",
            Self::Compilations => "compilations",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Albums => "Albums",
            Self::Singles => "Singles",
            Self::Compilations => "Compilations",
        }
    }

    pub fn album_type(&self) -> AlbumType {
        match self {
            Self::Albums => AlbumType::Album,
            Self::Singles => AlbumType::Single,
            Self::Compilations => AlbumType::Compilation,
        }
    }

    fn from_fragment(fragment: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|section| section.fragment() == fragment)
    }
}

/// Parsed service URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceUri {
    Playlists,
    Search(String),
    Track(String),
    Album(String),
    Artist {
        id: String,
        section: Option<AlbumSection>,
    },
    Playlist(String),
    Image(ImageId),
}

fn valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}

impl ServiceUri {
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix(SCHEME)?.strip_prefix(':')?;
        if rest == "playlists" {
            return Some(Self::Playlists);
        }
        let (kind, value) = rest.split_once(':')?;
        match kind {
            "search" => {
                let query = urlencoding::decode(value)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                (!query.trim().is_empty()).then_some(Self::Search(query))
            }
            "track" => valid_id(value).then(|| Self::Track(value.to_string())),
            "album" => valid_id(value).then(|| Self::Album(value.to_string())),
            "playlist" => valid_id(value).then(|| Self::Playlist(value.to_string())),
            "artist" => {
                let (id, section) = match value.split_once('#') {
                    Some((id, fragment)) => (id, AlbumSection::from_fragment(fragment)),
                    None => (value, None),
                };
                valid_id(id).then(|| Self::Artist {
                    id: id.to_string(),
                    section,
                })
            }
            "image" => parse_image_hex(value).map(Self::Image),
            _ => None,
        }
    }

    pub fn kind(&self) -> LinkKind {
        match self {
            Self::Playlists => LinkKind::Playlists,
            Self::Search(_) => LinkKind::Search,
            Self::Track(_) => LinkKind::Track,
            Self::Album(_) => LinkKind::Album,
            Self::Artist { .. } => LinkKind::Artist,
            Self::Playlist(_) => LinkKind::Playlist,
            Self::Image(_) => LinkKind::Image,
        }
    }

    /// Canonical URI without any fragment, as understood by the session.
    pub fn base_uri(&self) -> String {
        match self {
            Self::Playlists => format!("{SCHEME}:playlists"),
            Self::Search(query) => format!("{SCHEME}:search:{}", urlencoding::encode(query)),
            Self::Track(id) => format!("{SCHEME}:track:{id}"),
            Self::Album(id) => format!("{SCHEME}:album:{id}"),
            Self::Artist { id, .. } => format!("{SCHEME}:artist:{id}"),
            Self::Playlist(id) => format!("{SCHEME}:playlist:{id}"),
            Self::Image(id) => image_uri(id),
        }
    }
}

/// Returns true if the URI belongs to the service scheme.
pub fn can_handle(uri: &str) -> bool {
    uri.strip_prefix(SCHEME)
        .is_some_and(|rest| rest.starts_with(':'))
}

/// Builds the URI of one artist discography section.
pub fn artist_section_uri(artist_uri: &str, section: AlbumSection) -> String {
    let base = artist_uri.split('#').next().unwrap_or(artist_uri);
    format!("{base}#{}", section.fragment())
}

/// Formats an image id as `svc:image:<40 hex digits>`.
pub fn image_uri(id: &ImageId) -> String {
    let hex: String = id.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("{SCHEME}:image:{hex}")
}

/// Parses `svc:image:<40 hex digits>`.
pub fn parse_image_uri(uri: &str) -> Option<ImageId> {
    match ServiceUri::parse(uri)? {
        ServiceUri::Image(id) => Some(id),
        _ => None,
    }
}

pub(crate) fn parse_image_hex(hex: &str) -> Option<ImageId> {
    if hex.len() != 40 || !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return None;
    }
    let mut id = [0u8; 20];
    for (index, byte) in id.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16).ok()?;
    }
    Some(id)
}
