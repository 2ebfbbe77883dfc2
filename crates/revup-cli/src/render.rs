use console::style;
use stack_core::stack::TopicStack;
use stack_core::tags::{TAG_ASSIGNEE, TAG_LABEL, TAG_REVIEWER};
use stack_core::topic::{PrStatus, PushStatus};

/// Print a formatted view of whatever review state is currently populated,
/// newest topic first.
pub fn render_status(stack: &TopicStack, skip_empty: bool) {
  if skip_empty && stack.num_reviews_changed() == 0 {
    println!("Nothing to upload!");
    return;
  }

  for (name, topic) in stack.topics.iter().rev() {
    for (base, review) in &topic.reviews {
      if skip_empty && review.status == PrStatus::NoChange && review.push_status != PushStatus::Pushed {
        continue;
      }

      println!();

      let mut chain = String::new();
      if let Some(relative) = &topic.relative_topic {
        let ellipsis = if stack.topics.get(relative).is_some_and(|r| r.relative_topic.is_some()) {
          "… → "
        } else {
          ""
        };
        chain = format!("{} → {ellipsis}", style(relative).yellow().bold());
      }
      if !review.relative_branch.is_empty() {
        chain.push_str(&format!("{} → ", style(&review.relative_branch).magenta().bold()));
      }
      let draft = if review.is_draft { " (draft)" } else { "" };

      println!(
        "{} {}{draft} → {chain}{}",
        style("Topic:").green(),
        style(name).cyan().bold(),
        style(base).red().bold()
      );
      tracing::debug!("Base rev: {:?}", review.base_ref);
      if let Some(new_head) = review.new_commits.last() {
        tracing::debug!("New head: {new_head}");
      }

      let (reviewers, assignees, labels) = match &review.pr_info {
        Some(pr_info) => (
          pr_info.reviewers.iter().cloned().collect::<Vec<_>>(),
          pr_info.assignees.iter().cloned().collect::<Vec<_>>(),
          pr_info.labels.iter().cloned().collect::<Vec<_>>(),
        ),
        None => (
          topic.tags.values(TAG_REVIEWER).map(String::from).collect(),
          topic.tags.values(TAG_ASSIGNEE).map(String::from).collect(),
          topic.tags.values(TAG_LABEL).map(String::from).collect(),
        ),
      };
      if !reviewers.is_empty() {
        println!("{} {}", style("Reviewers:").green(), reviewers.join(", "));
      }
      if !assignees.is_empty() {
        println!("{} {}", style("Assignees:").green(), assignees.join(", "));
      }
      if !labels.is_empty() {
        println!("{} {}", style("Labels:").green(), labels.join(", "));
      }

      println!("{}", style("Commits:").green());
      for (i, commit) in topic.original_commits.iter().enumerate() {
        if i == 0 {
          // The first commit's title becomes the PR title
          println!("  {}", style(&commit.title).green().bold());
        } else {
          println!("  {}", commit.title);
        }
      }

      if let Some(pr_info) = &review.pr_info {
        let mut status = format!("({})", review.status);
        if review.push_status != PushStatus::NoChange {
          // Push status is redundant when nothing changed
          status.push_str(&format!(" ({})", review.push_status));
        }
        println!("{}", style("Github URL:").green());
        println!("  {} {status}", style(&pr_info.url).underlined());
      }
    }
  }
}
