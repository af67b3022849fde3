//! Ordered group/key/value model of a setup.cfg file

/// Option names are case-insensitive in setup.cfg; they are stored lower-cased.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// One `[name]` block of a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    name: String,
    entries: Vec<(String, String)>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Group {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set `key` to `value`, keeping the key's position if it already exists
    ///
    /// Returns the previous value.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> Option<String> {
        let key = normalize_key(key);
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> Extend<(K, V)> for Group {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key.as_ref(), value);
        }
    }
}

/// A whole setup.cfg: groups in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    groups: Vec<Group>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.name == name)
    }

    /// The group called `name`, appended empty if it does not exist yet
    pub fn group_entry(&mut self, name: &str) -> &mut Group {
        let idx = match self.groups.iter().position(|g| g.name == name) {
            Some(idx) => idx,
            None => {
                self.groups.push(Group::new(name));
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx]
    }

    /// Add a whole group; entries of an existing group with the same name are
    /// updated in place.
    pub fn push_group(&mut self, group: Group) {
        match self.group_mut(group.name()) {
            Some(existing) => existing.extend(group.entries),
            None => self.groups.push(group),
        }
    }

    pub fn set(&mut self, group: &str, key: &str, value: impl Into<String>) -> Option<String> {
        self.group_entry(group).insert(key, value)
    }

    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.group(group).and_then(|g| g.get(key))
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }
}
