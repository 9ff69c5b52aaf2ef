use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(MessageRole {
    User => "user",
    Assistant => "assistant",
});

str_enum!(UploadKind {
    Image => "image",
    Dicom => "dicom",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn message_role_round_trip() {
        for (variant, s) in [(MessageRole::User, "user"), (MessageRole::Assistant, "assistant")] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(MessageRole::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn unknown_value_is_rejected() {
        assert!(MessageRole::from_str("system").is_err());
        assert!(UploadKind::from_str("pdf").is_err());
    }
}
