//! Offline placeholder personas
//!
//! Content is picked from fixed tables by `index mod len`, so the same index
//! always yields the same persona and no network is involved.

use crate::types::{Persona, PersonaContent, PersonaOrigin, PersonaStatus};

pub const NAMES: [&str; 8] = [
    "Analytical Anna",
    "Digital David",
    "Mobile Maria",
    "Social Sophie",
    "Gaming Gary",
    "Remote Rachel",
    "Trendy Tyler",
    "Budget Brian",
];

pub const TYPES: [&str; 7] = [
    "Digital Native",
    "Remote Worker",
    "Social Media Expert",
    "Mobile-First User",
    "Tech Enthusiast",
    "Casual Browser",
    "Power User",
];

pub const DESCRIPTIONS: [&str; 7] = [
    "Expects seamless digital experiences across all devices",
    "Values efficiency and clear navigation in applications",
    "Highly engaged with social features and sharing capabilities",
    "Primarily accesses content through mobile devices",
    "Early adopter of new technologies and features",
    "Prefers simple and straightforward interfaces",
    "Looks for advanced features and customization options",
];

pub const AVATARS: [&str; 5] = [
    "https://images.unsplash.com/photo-1494790108377-be9c29b29330",
    "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d",
    "https://images.unsplash.com/photo-1438761681033-6461ffad8d80",
    "https://images.unsplash.com/photo-1500648767791-00dcc994a43e",
    "https://images.unsplash.com/photo-1506794778202-cad84cf45f1d",
];

/// Avatar shown on a slot that is still loading
pub const LOADING_AVATAR: &str = "https://images.unsplash.com/photo-1535713875002-d1d0cf377fde";

pub fn placeholder_content(index: usize) -> PersonaContent {
    PersonaContent::new(
        NAMES[index % NAMES.len()],
        TYPES[index % TYPES.len()],
        DESCRIPTIONS[index % DESCRIPTIONS.len()],
        AVATARS[index % AVATARS.len()],
    )
}

/// Fresh idle slot holding placeholder content
pub fn placeholder_persona(index: usize) -> Persona {
    Persona::new(placeholder_content(index), PersonaOrigin::Placeholder)
        .with_status(PersonaStatus::Idle)
}

const LOADING_NAME: &str = "Loading...";
const LOADING_DESCRIPTION: &str = "Fetching persona...";

/// Content for a slot whose persona has not arrived yet
pub fn loading_content(label: &str) -> PersonaContent {
    PersonaContent::new(LOADING_NAME, label, LOADING_DESCRIPTION, LOADING_AVATAR)
}

/// Whether `content` is still the stand-in from [`loading_content`]
pub fn is_loading_content(content: &PersonaContent) -> bool {
    content.name == LOADING_NAME && content.description == LOADING_DESCRIPTION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_cycle_with_their_own_period() {
        for i in 0..20 {
            let base = placeholder_content(i);
            assert_eq!(base.name, placeholder_content(i + 8).name);
            assert_eq!(base.persona_type, placeholder_content(i + 7).persona_type);
            assert_eq!(base.description, placeholder_content(i + 14).description);
            assert_eq!(base.avatar, placeholder_content(i + 5).avatar);
        }
    }

    #[test]
    fn test_same_index_same_content() {
        assert_eq!(placeholder_content(3), placeholder_content(3));
        assert_ne!(placeholder_content(0).name, placeholder_content(1).name);
    }

    #[test]
    fn test_placeholder_persona_slot() {
        let a = placeholder_persona(0);
        let b = placeholder_persona(0);
        assert_eq!(a.content, b.content);
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, PersonaStatus::Idle);
        assert_eq!(a.origin, PersonaOrigin::Placeholder);
        assert!(!a.expanded);
        assert!(!a.is_locked);
    }
}
