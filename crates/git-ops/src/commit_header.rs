use anyhow::{Result, anyhow};

/// Field and record separators used in the `git log` pretty format. The
/// record separator keeps multi-line commit messages intact.
pub const COMMIT_FIELD_SEP: char = '\u{1f}';
pub const COMMIT_RECORD_SEP: char = '\u{1e}';

/// Pretty format producing one record per commit:
/// hash, tree, parents, author identity/date, committer identity/date, body.
/// Dates are requested in raw format so they can round-trip through
/// GIT_AUTHOR_DATE / GIT_COMMITTER_DATE into `git commit-tree`.
pub const COMMIT_LOG_FORMAT: &str = "%H%x1f%T%x1f%P%x1f%an%x1f%ae%x1f%ad%x1f%cn%x1f%ce%x1f%cd%x1f%B%x1e";

/// Parsed commit metadata, the unit the whole engine operates on.
/// Serializing a header back through `git commit-tree` with the same
/// tree/parents/identity/message yields the same commit id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitHeader {
  pub commit_id: String,
  pub tree: String,
  /// First parent is the structural parent within the stack
  pub parents: Vec<String>,
  pub author_name: String,
  pub author_email: String,
  /// Raw format date, e.g. "1700000000 +0100". Empty for synthetic commits,
  /// letting git fill in the current identity.
  pub author_date: String,
  pub committer_name: String,
  pub committer_email: String,
  pub committer_date: String,
  /// Full commit message
  pub commit_msg: String,
  /// First line of the commit message
  pub title: String,
}

impl CommitHeader {
  /// A header carrying only a tree, parents and message. Identity fields are
  /// left empty so `commit_tree` inherits the configured user.
  pub fn synthetic(tree: String, parents: Vec<String>, commit_msg: String) -> Self {
    let title = commit_msg.lines().next().unwrap_or("").to_string();
    Self {
      commit_id: String::new(),
      tree,
      parents,
      author_name: String::new(),
      author_email: String::new(),
      author_date: String::new(),
      committer_name: String::new(),
      committer_email: String::new(),
      committer_date: String::new(),
      commit_msg,
      title,
    }
  }

  /// Structural parent of the commit, failing on root commits which cannot
  /// appear inside a stack.
  pub fn first_parent(&self) -> Result<&str> {
    self.parents.first().map(String::as_str).ok_or_else(|| anyhow!("commit {} has no parent", self.commit_id))
  }

  /// Replace the commit message, keeping the title in sync.
  pub fn set_message(&mut self, commit_msg: String) {
    self.title = commit_msg.lines().next().unwrap_or("").to_string();
    self.commit_msg = commit_msg;
  }
}

/// Parse one pretty-format record into a CommitHeader.
pub fn parse_commit_header(record: &str) -> Result<CommitHeader> {
  let mut fields = record.split(COMMIT_FIELD_SEP);

  let commit_id = fields.next().ok_or_else(|| anyhow!("missing commit id field"))?.trim().to_string();
  let tree = fields.next().ok_or_else(|| anyhow!("missing tree field"))?.trim().to_string();
  let parents_field = fields.next().ok_or_else(|| anyhow!("missing parents field"))?;
  let author_name = fields.next().ok_or_else(|| anyhow!("missing author name field"))?.to_string();
  let author_email = fields.next().ok_or_else(|| anyhow!("missing author email field"))?.to_string();
  let author_date = fields.next().ok_or_else(|| anyhow!("missing author date field"))?.to_string();
  let committer_name = fields.next().ok_or_else(|| anyhow!("missing committer name field"))?.to_string();
  let committer_email = fields.next().ok_or_else(|| anyhow!("missing committer email field"))?.to_string();
  let committer_date = fields.next().ok_or_else(|| anyhow!("missing committer date field"))?.to_string();
  let message_field = fields.next().ok_or_else(|| anyhow!("missing message field"))?;

  let commit_msg = message_field.trim_end_matches('\n').to_string();
  let title = commit_msg.lines().next().unwrap_or("").to_string();
  let parents = parents_field.split_whitespace().map(String::from).collect();

  Ok(CommitHeader {
    commit_id,
    tree,
    parents,
    author_name,
    author_email,
    author_date,
    committer_name,
    committer_email,
    committer_date,
    commit_msg,
    title,
  })
}

/// Parse the raw output of a formatted `rev_list` call into headers,
/// skipping empty records.
pub fn parse_rev_list(raw: &str) -> Result<Vec<CommitHeader>> {
  let mut headers = Vec::new();
  for record in raw.split(COMMIT_RECORD_SEP) {
    let record = record.trim_start_matches('\n');
    if record.is_empty() {
      continue;
    }
    headers.push(parse_commit_header(record)?);
  }
  Ok(headers)
}

/// Whether author and commit message are the same for the given commits.
/// Used to distinguish a pure rebase from a reword.
pub fn commits_match(a: &CommitHeader, b: &CommitHeader) -> bool {
  a.title == b.title
    && a.author_name == b.author_name
    && a.author_email == b.author_email
    && a.committer_name == b.committer_name
    && a.committer_email == b.committer_email
    && a.commit_msg == b.commit_msg
}

/// Determine if the given commit-ish ref looks like a hash.
pub fn is_commit_hash(commit_ish: &str) -> bool {
  commit_ish.len() >= 8 && commit_ish.chars().all(|c| c.is_ascii_hexdigit())
}
