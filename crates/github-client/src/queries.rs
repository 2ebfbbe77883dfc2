use crate::endpoint::{GitHubEndpoint, GitHubResult};
use crate::pr::{MAX_COMMENTS_TO_QUERY, PrComment, PrInfo, PrUpdate, RepoInfo};
use anyhow::anyhow;
use serde_json::{Map, Value, json};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Everything the upload pipeline needs from the remote, fetched in one
/// GraphQL round trip.
#[derive(Debug, Default)]
pub struct RemoteState {
  pub repo_id: String,
  /// One entry per queried head ref; None when no open/merged PR exists
  pub prs: Vec<Option<PrInfo>>,
  pub names_to_ids: HashMap<String, String>,
  pub names_to_logins: HashMap<String, String>,
  pub labels_to_ids: HashMap<String, String>,
}

/// Node id and URL of a freshly created PR.
#[derive(Debug, Clone)]
pub struct CreatedPr {
  pub id: String,
  pub url: String,
}

fn result_names(count: usize, prefix: &str) -> Vec<String> {
  (0..count).map(|n| format!("{prefix}{n}")).collect()
}

fn arg_names(count: usize, prefix: &str) -> Vec<String> {
  (0..count).map(|n| format!("{prefix}{n}")).collect()
}

fn declarations(names: &[String], typ: &str) -> Vec<String> {
  names.iter().map(|name| format!("${name}: {typ}")).collect()
}

fn str_set(node: &Value, pointer: &str, key: &str) -> BTreeSet<String> {
  node
    .pointer(pointer)
    .and_then(Value::as_array)
    .map(|nodes| {
      nodes
        .iter()
        .filter_map(|n| n.get(key).and_then(Value::as_str))
        .map(String::from)
        .collect()
    })
    .unwrap_or_default()
}

fn parse_pr_node(node: &Value, head_ref: &str) -> GitHubResult<PrInfo> {
  let mut labels = BTreeSet::new();
  let mut label_ids = BTreeSet::new();
  for label in node.pointer("/labels/nodes").and_then(Value::as_array).unwrap_or(&Vec::new()) {
    if let (Some(name), Some(id)) = (label.get("name").and_then(Value::as_str), label.get("id").and_then(Value::as_str)) {
      labels.insert(name.to_string());
      label_ids.insert(id.to_string());
    }
  }

  let mut reviewers = BTreeSet::new();
  let mut reviewer_ids = BTreeSet::new();
  for request in node.pointer("/reviewRequests/nodes").and_then(Value::as_array).unwrap_or(&Vec::new()) {
    let Some(reviewer) = request.get("requestedReviewer").filter(|r| !r.is_null()) else {
      continue;
    };
    if let (Some(login), Some(id)) = (reviewer.get("login").and_then(Value::as_str), reviewer.get("id").and_then(Value::as_str)) {
      reviewers.insert(login.to_string());
      reviewer_ids.insert(id.to_string());
    }
  }
  // Users who already reviewed count as reviewers too, but the uploader's
  // own review must not trigger a re-request.
  for review in node.pointer("/latestReviews/nodes").and_then(Value::as_array).unwrap_or(&Vec::new()) {
    if review.get("viewerDidAuthor").and_then(Value::as_bool) == Some(true) {
      continue;
    }
    if let (Some(login), Some(id)) = (
      review.pointer("/author/login").and_then(Value::as_str),
      review.pointer("/author/id").and_then(Value::as_str),
    ) {
      reviewers.insert(login.to_string());
      reviewer_ids.insert(id.to_string());
    }
  }

  let assignees = str_set(node, "/assignees/nodes", "login");
  let assignee_ids = str_set(node, "/assignees/nodes", "id");

  let head_ref_oid = node
    .get("headRefOid")
    .and_then(Value::as_str)
    .ok_or_else(|| anyhow!("PR node missing headRefOid"))?
    .to_string();

  // The API's baseRefOid names the current tip of the base branch, which
  // may not exist locally. The base the PR was actually uploaded against is
  // the first parent of its oldest commit.
  let base_ref_oid = node
    .pointer("/commits/nodes/0/commit/parents/nodes/0/oid")
    .and_then(Value::as_str)
    .unwrap_or(&head_ref_oid)
    .to_string();

  let comments = node
    .pointer("/comments/nodes")
    .and_then(Value::as_array)
    .map(|nodes| {
      nodes
        .iter()
        .filter_map(|c| {
          Some(PrComment::new(
            c.get("body").and_then(Value::as_str)?.to_string(),
            c.get("id").and_then(Value::as_str).map(String::from),
          ))
        })
        .collect()
    })
    .unwrap_or_default();

  Ok(PrInfo {
    id: node.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
    url: node.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
    base_ref: node.get("baseRefName").and_then(Value::as_str).unwrap_or_default().to_string(),
    head_ref: head_ref.to_string(),
    base_ref_oid,
    head_ref_oid,
    body: node.get("body").and_then(Value::as_str).unwrap_or_default().to_string(),
    title: node.get("title").and_then(Value::as_str).unwrap_or_default().to_string(),
    reviewers,
    reviewer_ids,
    assignees,
    assignee_ids,
    labels,
    label_ids,
    is_draft: node.get("isDraft").and_then(Value::as_bool).unwrap_or(false),
    state: node.get("state").and_then(Value::as_str).unwrap_or_default().to_string(),
    comments,
  })
}

/// Build the single batched query document for PRs, assignable users and
/// label ids. Exposed for tests.
pub fn build_everything_query(head_refs: &[String], user_names: &[String], labels: &[String]) -> String {
  let pr_args = arg_names(head_refs.len(), "pr");
  let user_args = arg_names(user_names.len(), "user");
  let label_args = arg_names(labels.len(), "label");

  let pr_out = result_names(head_refs.len(), "pr_out");
  let user_out = result_names(user_names.len(), "user_out");
  let label_out = result_names(labels.len(), "label_out");

  let mut declarations_list = vec!["$owner: String!".to_string(), "$name: String!".to_string()];
  declarations_list.extend(declarations(&pr_args, "String!"));
  declarations_list.extend(declarations(&user_args, "String!"));
  declarations_list.extend(declarations(&label_args, "String!"));
  let arg_str = declarations_list.join(", ");

  // The most recently updated open or merged PR stands in for "the" PR of a
  // head ref; GitHub offers no way to prefer open PRs directly.
  let mut body = String::new();
  for (out, arg) in pr_out.iter().zip(&pr_args) {
    body.push_str(&format!(
      "{out}: pullRequests (headRefName: ${arg}, states: [OPEN, MERGED], first: 1, \
       orderBy: {{direction: DESC, field:UPDATED_AT}}) {{...PrResult}},"
    ));
  }
  for (out, arg) in user_out.iter().zip(&user_args) {
    body.push_str(&format!("{out}: assignableUsers (query: ${arg}, first: 25) {{...UserResult}},"));
  }
  for (out, arg) in label_out.iter().zip(&label_args) {
    body.push_str(&format!("{out}: label (name: ${arg}) {{...LabelResult}},"));
  }

  let mut query = format!(
    "query GetPrResults({arg_str}) {{\n  repository(name: $name, owner: $owner) {{\n    id\n    {body}\n  }}\n}}"
  );

  if !user_names.is_empty() {
    query.push_str(
      "\nfragment UserResult on UserConnection {\n  nodes {\n    login\n    id\n  }\n  totalCount\n}",
    );
  }
  if !labels.is_empty() {
    query.push_str("\nfragment LabelResult on Label {\n  id\n  name\n}");
  }
  if !head_refs.is_empty() {
    query.push_str(&format!(
      "\nfragment PrResult on PullRequestConnection {{
  nodes {{
    id
    state
    url
    baseRefName
    headRefOid
    body
    title
    isDraft
    updatedAt
    commits (first: 1) {{ nodes {{ commit {{ parents (first: 1) {{ nodes {{ oid }} }} }} }} }}
    reviewRequests (first: 25) {{ nodes {{ requestedReviewer {{ ... on User {{ login id }} }} }} }}
    latestReviews (first: 25) {{ nodes {{ author {{ ... on User {{ login id }} }} viewerDidAuthor }} }}
    assignees (first: 25) {{ nodes {{ ... on User {{ login id }} }} }}
    labels (first: 25) {{ nodes {{ name id }} }}
    comments (first: {MAX_COMMENTS_TO_QUERY}) {{ nodes {{ body id }} }}
  }}
  totalCount
}}"
    ));
  }
  query
}

/// Fetch repository id, one PR per head ref, user node ids and label node
/// ids in a single request.
pub async fn query_everything<E: GitHubEndpoint>(
  ep: &E,
  repo_info: &RepoInfo,
  head_refs: &[String],
  user_names: &[String],
  labels: &[String],
) -> GitHubResult<RemoteState> {
  let query = build_everything_query(head_refs, user_names, labels);

  let mut variables = Map::new();
  variables.insert("owner".into(), Value::String(repo_info.owner.clone()));
  variables.insert("name".into(), Value::String(repo_info.name.clone()));
  for (arg, value) in arg_names(head_refs.len(), "pr").into_iter().zip(head_refs) {
    variables.insert(arg, Value::String(value.clone()));
  }
  for (arg, value) in arg_names(user_names.len(), "user").into_iter().zip(user_names) {
    variables.insert(arg, Value::String(value.clone()));
  }
  for (arg, value) in arg_names(labels.len(), "label").into_iter().zip(labels) {
    variables.insert(arg, Value::String(value.clone()));
  }

  let result = ep.graphql(&query, Value::Object(variables), true).await?;
  let repository = result
    .pointer("/data/repository")
    .ok_or_else(|| anyhow!("Query response is missing the repository node"))?;

  let repo_id = repository
    .get("id")
    .and_then(Value::as_str)
    .ok_or_else(|| anyhow!("Query response is missing the repository id"))?
    .to_string();

  let mut prs = Vec::with_capacity(head_refs.len());
  for (out, head_ref) in result_names(head_refs.len(), "pr_out").iter().zip(head_refs) {
    let nodes = repository.pointer(&format!("/{out}/nodes")).and_then(Value::as_array);
    match nodes {
      Some(nodes) if nodes.len() == 1 => prs.push(Some(parse_pr_node(&nodes[0], head_ref)?)),
      _ => prs.push(None),
    }
  }

  let mut names_to_ids = HashMap::new();
  let mut names_to_logins = HashMap::new();
  for (out, user_name) in result_names(user_names.len(), "user_out").iter().zip(user_names) {
    let Some(connection) = repository.get(out) else { continue };
    let nodes = connection.get("nodes").and_then(Value::as_array).cloned().unwrap_or_default();
    let total = connection.get("totalCount").and_then(Value::as_u64).unwrap_or(0) as usize;
    if nodes.is_empty() {
      warn!("No matching user found for {user_name}");
      continue;
    }
    if total > nodes.len() {
      warn!("Too many matching users found for {user_name}");
      continue;
    }
    // The shortest login wins: the search matches prefixes and the exact
    // name is never longer than any other match.
    let mut shortest: Option<(&str, &str)> = None;
    for node in &nodes {
      if let (Some(login), Some(id)) = (node.get("login").and_then(Value::as_str), node.get("id").and_then(Value::as_str))
        && shortest.is_none_or(|(best, _)| login.len() <= best.len())
      {
        shortest = Some((login, id));
      }
    }
    if let Some((login, id)) = shortest {
      names_to_ids.insert(user_name.clone(), id.to_string());
      names_to_logins.insert(user_name.clone(), login.to_string());
    }
  }

  let mut labels_to_ids = HashMap::new();
  for (out, label) in result_names(labels.len(), "label_out").iter().zip(labels) {
    match repository.get(out) {
      Some(node) if !node.is_null() => {
        if let Some(id) = node.get("id").and_then(Value::as_str) {
          labels_to_ids.insert(label.clone(), id.to_string());
        }
      }
      _ => warn!("Couldn't find an existing label named {label}"),
    }
  }

  debug!(prs = prs.iter().filter(|p| p.is_some()).count(), users = names_to_ids.len(), "queried remote state");
  Ok(RemoteState {
    repo_id,
    prs,
    names_to_ids,
    names_to_logins,
    labels_to_ids,
  })
}

/// Build the createPullRequest mutation document. Exposed for tests.
pub fn build_create_mutation(count: usize) -> String {
  let args = arg_names(count, "pr");
  let outs = result_names(count, "pr_out");
  let arg_str = declarations(&args, "CreatePullRequestInput!").join(", ");

  let mut body = String::new();
  for (out, arg) in outs.iter().zip(&args) {
    body.push_str(&format!(
      "\n  {out}: createPullRequest(input: ${arg}) {{\n    pullRequest {{\n      id\n      url\n    }}\n  }},"
    ));
  }
  format!("mutation ({arg_str}) {{{body}\n}}")
}

/// Create all pull requests in one mutation. Creation can fail per-node
/// when a head branch was merged in a race; those entries come back None
/// and the caller retries on the next run.
pub async fn create_pull_requests<E: GitHubEndpoint>(
  ep: &E,
  repo_id: &str,
  repo_info: &RepoInfo,
  fork_info: &RepoInfo,
  prs: &[PrInfo],
) -> GitHubResult<Vec<Option<CreatedPr>>> {
  if prs.is_empty() {
    return Ok(Vec::new());
  }

  let mut variables = Map::new();
  for (arg, pr) in arg_names(prs.len(), "pr").into_iter().zip(prs) {
    let head_ref = if fork_info.owner == repo_info.owner {
      pr.head_ref.clone()
    } else {
      format!("{}:{}", fork_info.owner, pr.head_ref)
    };
    variables.insert(
      arg,
      json!({
        "baseRefName": pr.base_ref,
        "body": pr.body,
        "clientMutationId": "revup",
        "headRefName": head_ref,
        "repositoryId": repo_id,
        "title": pr.title,
        "draft": pr.is_draft,
      }),
    );
  }

  let result = ep.graphql(&build_create_mutation(prs.len()), Value::Object(variables), false).await?;

  let mut created = Vec::with_capacity(prs.len());
  for out in result_names(prs.len(), "pr_out") {
    let node = result.pointer(&format!("/data/{out}/pullRequest"));
    match node {
      Some(node) if !node.is_null() => created.push(Some(CreatedPr {
        id: node.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
        url: node.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
      })),
      _ => created.push(None),
    }
  }
  Ok(created)
}

/// Update pull request contents, reviewers, assignees, labels, draft state
/// and maintained comments in one mutation. New comments are placed first
/// in the document so they float to the top of each PR.
pub async fn update_pull_requests<E: GitHubEndpoint>(ep: &E, prs: &[PrUpdate]) -> GitHubResult<()> {
  let mut updates: Vec<Value> = Vec::new();
  let mut labels: Vec<Value> = Vec::new();
  let mut reviewers: Vec<Value> = Vec::new();
  let mut assignees: Vec<Value> = Vec::new();
  let mut convert_to_draft: Vec<Value> = Vec::new();
  let mut convert_from_draft: Vec<Value> = Vec::new();
  let mut comments: Vec<Value> = Vec::new();
  let mut edit_comments: Vec<Value> = Vec::new();

  for pr in prs {
    let mut update = Map::new();
    update.insert("clientMutationId".into(), json!("revup"));
    update.insert("pullRequestId".into(), json!(pr.id));
    if let Some(base_ref) = &pr.base_ref {
      update.insert("baseRefName".into(), json!(base_ref));
    }
    if let Some(body) = &pr.body {
      update.insert("body".into(), json!(body));
    }
    if let Some(title) = &pr.title {
      update.insert("title".into(), json!(title));
    }
    updates.push(Value::Object(update));

    if !pr.label_ids.is_empty() {
      labels.push(json!({
        "labelIds": pr.label_ids.iter().collect::<Vec<_>>(),
        "clientMutationId": "revup",
        "labelableId": pr.id,
      }));
    }
    if !pr.reviewer_ids.is_empty() {
      reviewers.push(json!({
        "userIds": pr.reviewer_ids.iter().collect::<Vec<_>>(),
        "clientMutationId": "revup",
        "pullRequestId": pr.id,
        "union": true,
      }));
    }
    if !pr.assignee_ids.is_empty() {
      assignees.push(json!({
        "assigneeIds": pr.assignee_ids.iter().collect::<Vec<_>>(),
        "clientMutationId": "revup",
        "assignableId": pr.id,
      }));
    }
    if let Some(is_draft) = pr.is_draft {
      let input = json!({ "clientMutationId": "revup", "pullRequestId": pr.id });
      if is_draft {
        convert_to_draft.push(input);
      } else {
        convert_from_draft.push(input);
      }
    }
    for comment in &pr.comments {
      if let Some(id) = &comment.id {
        edit_comments.push(json!({ "body": comment.text, "clientMutationId": "revup", "id": id }));
      } else {
        comments.push(json!({ "body": comment.text, "clientMutationId": "revup", "subjectId": pr.id }));
      }
    }
  }

  let sections: [(&str, &str, &str, &[Value]); 8] = [
    ("com", "AddCommentInput!", "addComment", &comments),
    ("pr", "UpdatePullRequestInput!", "updatePullRequest", &updates),
    ("rev", "RequestReviewsInput!", "requestReviews", &reviewers),
    ("asn", "AddAssigneesToAssignableInput!", "addAssigneesToAssignable", &assignees),
    ("label", "AddLabelsToLabelableInput!", "addLabelsToLabelable", &labels),
    ("to_d", "ConvertPullRequestToDraftInput!", "convertPullRequestToDraft", &convert_to_draft),
    ("from_d", "MarkPullRequestReadyForReviewInput!", "markPullRequestReadyForReview", &convert_from_draft),
    ("edit_com", "UpdateIssueCommentInput!", "updateIssueComment", &edit_comments),
  ];

  let mut declaration_list: Vec<String> = Vec::new();
  let mut body = String::new();
  let mut variables = Map::new();
  for (prefix, typ, field, inputs) in sections {
    let args = arg_names(inputs.len(), prefix);
    declaration_list.extend(declarations(&args, typ));
    for (n, (arg, input)) in args.iter().zip(inputs.iter()).enumerate() {
      body.push_str(&format!("\n  {prefix}_out{n}: {field}(input: ${arg}) {{\n    clientMutationId\n  }},"));
      variables.insert(arg.clone(), input.clone());
    }
  }

  if variables.is_empty() {
    return Ok(());
  }

  let mutation = format!("mutation ({}) {{{body}\n}}", declaration_list.join(", "));
  ep.graphql(&mutation, Value::Object(variables), true).await?;
  Ok(())
}
