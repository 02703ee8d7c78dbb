//! Name normalizer: turns a free-text author list into structured names.

/// One person's name split into given names and family name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameComponents {
    /// Everything before the last whitespace run, if any.
    pub first_names: Option<String>,
    /// The final word of the name. Never empty.
    pub last_name: String,
}

impl NameComponents {
    /// A name with only a family name.
    pub fn last_only(last_name: impl Into<String>) -> Self {
        Self {
            first_names: None,
            last_name: last_name.into(),
        }
    }
}

/// Split a comma-separated list of names.
///
/// Blank tokens are dropped. Within a token the last whitespace run separates
/// the first names from the last name, so `"Ursula K.  Le"` yields
/// `("Ursula K.", "Le")`. Output order follows token order.
pub fn split(name_list: &str) -> Vec<NameComponents> {
    name_list
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(split_one)
        .collect()
}

fn split_one(token: &str) -> NameComponents {
    let Some((idx, _)) = token.char_indices().rev().find(|(_, c)| c.is_whitespace()) else {
        return NameComponents::last_only(token);
    };

    // token is trimmed, so there is text on both sides of the whitespace run
    let last_name = token[idx..].trim();
    let first_names = token[..idx].trim();
    NameComponents {
        first_names: (!first_names.is_empty()).then(|| first_names.to_string()),
        last_name: last_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(pairs: &[(Option<&str>, &str)]) -> Vec<NameComponents> {
        pairs
            .iter()
            .map(|(first, last)| NameComponents {
                first_names: first.map(str::to_string),
                last_name: last.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_blank_input_yields_nothing() {
        for input in ["", "  ", ",", " , ", ",,\t,"] {
            assert!(split(input).is_empty(), "input {input:?}");
        }
    }

    #[test]
    fn test_split_table() {
        let cases: &[(&str, &[(Option<&str>, &str)])] = &[
            ("Lastname", &[(None, "Lastname")]),
            ("Firstname Lastname", &[(Some("Firstname"), "Lastname")]),
            ("Firstname   Lastname", &[(Some("Firstname"), "Lastname")]),
            ("Firstname  ,  Lastname", &[(None, "Firstname"), (None, "Lastname")]),
            ("Firstname Middle Lastname", &[(Some("Firstname Middle"), "Lastname")]),
            (
                "Firstname Lastname, F2 L2, XYZ",
                &[(Some("Firstname"), "Lastname"), (Some("F2"), "L2"), (None, "XYZ")],
            ),
            ("Author 1, Author 2", &[(Some("Author"), "1"), (Some("Author"), "2")]),
            (" Le Guin ,", &[(Some("Le"), "Guin")]),
        ];

        for (input, expected) in cases {
            assert_eq!(split(input), names(expected), "input {input:?}");
        }
    }

    #[test]
    fn test_last_name_never_blank() {
        for input in ["a\tb", "x  ", "  y", "p q r, s"] {
            for name in split(input) {
                assert!(!name.last_name.trim().is_empty());
                assert_eq!(name.last_name, name.last_name.trim());
            }
        }
    }

    #[test]
    fn test_tab_separated_name() {
        assert_eq!(
            split("Jane\tAusten"),
            vec![NameComponents {
                first_names: Some("Jane".into()),
                last_name: "Austen".into(),
            }]
        );
    }
}
