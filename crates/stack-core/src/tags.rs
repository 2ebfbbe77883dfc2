use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

pub const TAG_REVIEWER: &str = "reviewer";
pub const TAG_ASSIGNEE: &str = "assignee";
pub const TAG_BRANCH: &str = "branch";
pub const TAG_LABEL: &str = "label";
pub const TAG_TOPIC: &str = "topic";
pub const TAG_RELATIVE: &str = "relative";
pub const TAG_RELATIVE_BRANCH: &str = "relative-branch";
pub const TAG_UPLOADER: &str = "uploader";

pub const VALID_TAGS: [&str; 8] = [
  TAG_BRANCH,
  TAG_LABEL,
  TAG_RELATIVE,
  TAG_RELATIVE_BRANCH,
  TAG_REVIEWER,
  TAG_ASSIGNEE,
  TAG_TOPIC,
  TAG_UPLOADER,
];

fn tag_line() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^(?P<tagname>[a-zA-Z\-]+):(?P<tagvalue>.*)$").unwrap())
}

fn commit_label() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^(?P<label1>[a-zA-Z\-_0-9]+):.*|^\[(?P<label2>[a-zA-Z\-_0-9]+)\].*").unwrap())
}

/// Tag values per tag name. Sets keep values deduplicated and ordered so
/// picking "the" value of a singular tag is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(BTreeMap<String, BTreeSet<String>>);

impl Tags {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn values(&self, tag: &str) -> impl Iterator<Item = &str> {
    self.0.get(tag).into_iter().flatten().map(String::as_str)
  }

  pub fn set(&self, tag: &str) -> BTreeSet<String> {
    self.0.get(tag).cloned().unwrap_or_default()
  }

  pub fn count(&self, tag: &str) -> usize {
    self.0.get(tag).map_or(0, BTreeSet::len)
  }

  /// Smallest value of the tag, the deterministic pick for singular tags.
  pub fn first(&self, tag: &str) -> Option<&str> {
    self.0.get(tag).and_then(|set| set.iter().next()).map(String::as_str)
  }

  pub fn contains(&self, tag: &str, value: &str) -> bool {
    self.0.get(tag).is_some_and(|set| set.contains(value))
  }

  pub fn insert(&mut self, tag: &str, value: String) {
    self.0.entry(tag.to_string()).or_default().insert(value);
  }

  pub fn remove_value(&mut self, tag: &str, value: &str) -> bool {
    self.0.get_mut(tag).is_some_and(|set| set.remove(value))
  }

  pub fn extend(&mut self, tag: &str, values: impl IntoIterator<Item = String>) {
    self.0.entry(tag.to_string()).or_default().extend(values);
  }

  /// Union all tags from `other` into self.
  pub fn add_tags(&mut self, other: &Tags) {
    for (tag, values) in &other.0 {
      self.0.entry(tag.clone()).or_default().extend(values.iter().cloned());
    }
  }

  /// Rewrite reviewer/assignee values through the alias -> target mapping.
  pub fn apply_user_aliases(&mut self, user_aliases: &str) {
    for mapping in user_aliases.split(',') {
      let Some((alias, target)) = mapping.split_once(':') else {
        continue;
      };
      for tag in [TAG_REVIEWER, TAG_ASSIGNEE] {
        if self.remove_value(tag, alias) {
          self.insert(tag, target.to_string());
        }
      }
    }
  }
}

/// Parse all commit tags in the commit message, returning them along with a
/// version of the message with recognized tag lines removed. Parsing is
/// generous: names are case-insensitive, ungrammatical plural forms are
/// accepted, values are comma separated and repeated tags accumulate.
/// Unrecognized tag-shaped lines stay part of the message.
pub fn parse_commit_tags(remote_name: &str, commit_msg: &str) -> (Tags, String) {
  let mut tags = Tags::new();
  let mut trimmed_msg: Vec<&str> = Vec::new();

  for line in commit_msg.split('\n') {
    let Some(captures) = tag_line().captures(line) else {
      trimmed_msg.push(line);
      continue;
    };
    let mut tag = captures["tagname"].to_lowercase().trim().to_string();
    let mut values: BTreeSet<String> = captures["tagvalue"].split(',').map(|v| v.trim().to_string()).collect();

    if !tag.starts_with(TAG_RELATIVE) && !tag.starts_with(TAG_TOPIC) && !tag.starts_with(TAG_UPLOADER) {
      // That's right, plurals don't even have to be grammatically correct
      if let Some(stripped) = tag.strip_suffix("ees") {
        tag = format!("{stripped}ee");
      } else if let Some(stripped) = tag.strip_suffix("es") {
        tag = stripped.to_string();
      } else if let Some(stripped) = tag.strip_suffix('s') {
        tag = stripped.to_string();
      }
    }

    values.remove("");
    if VALID_TAGS.contains(&tag.as_str()) {
      if tag == TAG_BRANCH || tag == TAG_RELATIVE_BRANCH {
        values = values
          .into_iter()
          .map(|branch| {
            if branch.starts_with(&format!("{remote_name}/")) {
              branch
            } else {
              format!("{remote_name}/{branch}")
            }
          })
          .collect();
      }
      tags.extend(&tag, values);
    } else {
      trimmed_msg.push(line);
    }
  }

  (tags, trimmed_msg.join("\n").trim().to_string())
}

/// Topic name synthesized from the first five words of the title,
/// lowercased, joined by underscores, with `:` `[` `]` stripped.
pub fn auto_topic_name(trimmed_msg: &str) -> String {
  trimmed_msg
    .split('\n')
    .next()
    .unwrap_or_default()
    .to_lowercase()
    .split_whitespace()
    .take(5)
    .collect::<Vec<_>>()
    .join("_")
    .replace([':', '[', ']'], "")
}

/// Label implied by a `foo: ...` or `[foo] ...` commit title prefix.
pub fn commit_prefix_label(commit_msg: &str) -> Option<String> {
  let captures = commit_label().captures(commit_msg)?;
  captures
    .name("label1")
    .or_else(|| captures.name("label2"))
    .map(|label| label.as_str().to_lowercase())
}

/// Naming scheme for remote head refs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchFormat {
  /// `<uploader>/revup/<base-branch>/<topic>`
  #[default]
  UserBranch,
  /// `<uploader>/revup/<topic>`
  User,
  /// `revup/<base-branch>/<topic>`
  Branch,
  /// `revup/<topic>`
  None,
}

impl std::str::FromStr for BranchFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "user+branch" => Ok(Self::UserBranch),
      "user" => Ok(Self::User),
      "branch" => Ok(Self::Branch),
      "none" => Ok(Self::None),
      other => Err(format!("invalid branch format '{other}'")),
    }
  }
}

/// Remote branch name for a review. Branches are named so it is clear they
/// are made by revup and can be force pushed at any time, and to minimize
/// collision with manually created branches.
pub fn format_remote_branch(uploader: &str, base_branch: &str, topic: &str, format: BranchFormat) -> String {
  match format {
    BranchFormat::UserBranch => format!("{uploader}/revup/{base_branch}/{topic}"),
    BranchFormat::User => format!("{uploader}/revup/{topic}"),
    BranchFormat::Branch => format!("revup/{base_branch}/{topic}"),
    BranchFormat::None => format!("revup/{topic}"),
  }
}
