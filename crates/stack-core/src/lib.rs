pub mod amend;
pub mod error;
pub mod patch_ids;
pub mod publish;
pub mod reconcile;
pub mod restack;
pub mod stack;
pub mod synthesize;
pub mod tags;
pub mod topic;

#[cfg(test)]
mod amend_test;

#[cfg(test)]
mod tags_test;

#[cfg(test)]
mod stack_test;

#[cfg(test)]
mod reconcile_test;


#[cfg(test)]
mod publish_test;

#[cfg(test)]
mod restack_test;
