use crate::config::files_handling::{read_input, save_output};
use crate::error::Result;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;


/// Bidirectional token <-> id table. Ids are dense, zero based and handed
/// out in first-seen order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Dictionary {
    tokens: Vec<String>,
    token_ids: HashMap<String, usize>,
}

impl Dictionary {

    pub fn new() -> Dictionary {
        Self::default()
    }

    pub fn from_tokens<I, S>(tokens: I) -> Dictionary
    where
        I: IntoIterator<Item = S>,
        S: Into<String> {

        let mut dictionary = Dictionary::new();
        for token in tokens {
            dictionary.get_id(&token.into());
        }
        dictionary
    }

    /// Id of `token`, adding it with the next free id if unseen.
    pub fn get_id(&mut self, token: &str) -> usize {
        if let Some(id) = self.token_ids.get(token) {
            return *id;
        }
        let id = self.tokens.len();
        self.tokens.push(token.to_owned());
        self.token_ids.insert(token.to_owned(), id);
        id
    }

    pub fn get_id_opt(&self, token: &str) -> Option<usize> {
        self.token_ids.get(token).copied()
    }

    pub fn get_token(&self, id: usize) -> Option<&str> {
        self.tokens.get(id).map(|t| t.as_str())
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn token_ids(&self) -> &HashMap<String, usize> {
        &self.token_ids
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Write `dictionary.json` into the directory `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        save_output(path, "dictionary", self)
    }

    pub fn load(path: &Path) -> Result<Dictionary> {
        read_input(&path.join("dictionary"))
    }

    /// Relabel so that new id `i` holds the token that had id `order[i]`.
    /// Tokens whose old id is absent from `order` are dropped.
    pub(crate) fn reorder(&mut self, order: &[usize]) {
        let tokens: Vec<String> = order.iter().map(|old| self.tokens[*old].clone()).collect();
        *self = Dictionary::from(tokens);
    }
}

impl From<Vec<String>> for Dictionary {
    fn from(tokens: Vec<String>) -> Self {
        let token_ids = tokens.iter().enumerate().map(|(i, t)| (t.to_owned(), i)).collect();
        Self { tokens, token_ids }
    }
}

impl From<Dictionary> for Vec<String> {
    fn from(dictionary: Dictionary) -> Self {
        dictionary.tokens
    }
}


#[cfg(test)]
mod tests {

    use super::Dictionary;

    #[test]
    fn ids_follow_first_seen_order() {
        let mut dictionary = Dictionary::from_tokens(["banana", "socks", "banana", "car"]);
        assert_eq!(dictionary.tokens(), &["banana", "socks", "car"]);
        assert_eq!(dictionary.get_id("car"), 2);
        assert_eq!(dictionary.get_id("field"), 3);
        assert_eq!(dictionary.get_id_opt("rice"), None);
        assert_eq!(dictionary.get_token(1), Some("socks"));
        for (i, token) in dictionary.tokens().iter().enumerate() {
            assert_eq!(dictionary.token_ids()[token], i);
        }
    }

    #[test]
    fn reorder_relabels_and_drops() {
        let mut dictionary = Dictionary::from_tokens(["field", "car", "socks", "banana"]);
        dictionary.reorder(&[3, 2, 1]);
        assert_eq!(dictionary.tokens(), &["banana", "socks", "car"]);
        assert_eq!(dictionary.get_id_opt("field"), None);
        assert_eq!(dictionary.get_id_opt("car"), Some(2));
    }

    #[test]
    fn serializes_as_token_list() {
        let dictionary = Dictionary::from_tokens(["a", "b"]);
        let json = serde_json::to_string(&dictionary).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
        let back: Dictionary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dictionary);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let dictionary = Dictionary::from_tokens(["the", "car", "wheels"]);
        dictionary.save(dir.path()).unwrap();
        assert!(dir.path().join("dictionary.json").exists());
        assert_eq!(Dictionary::load(dir.path()).unwrap(), dictionary);
        assert!(Dictionary::load(&dir.path().join("missing")).is_err());
    }
}
