use std::collections::HashMap;

use tracing::{info, warn};

use crate::model::{dedup_in_order, CardObservation, ProfessorRecord};

/// Identity of a professor within one collection run: the card name with
/// surrounding whitespace removed and inner runs of whitespace collapsed.
/// Case and diacritics are kept as printed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey(String);

impl MergeKey {
    pub fn from_name(name: &str) -> Option<Self> {
        let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            None
        } else {
            Some(Self(collapsed))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created,
    Merged { new_majors: usize, new_fields: usize },
    /// Blank name; nothing recorded.
    Discarded,
}

#[derive(Debug)]
struct PendingRecord {
    name: String,
    university: String,
    majors: Vec<String>,
    h_index: String,
    profile_url: String,
    email: String,
    research_fields: Vec<String>,
}

/// Accumulates card observations for one run, keyed by [`MergeKey`], in
/// first-seen order.
#[derive(Debug, Default)]
pub struct MergeTable {
    index: HashMap<MergeKey, usize>,
    pending: Vec<PendingRecord>,
}

impl MergeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Fold one card into the table. `group_title` is the cleaned title of the
    /// major group the card was found under.
    pub fn observe(&mut self, obs: CardObservation, group_title: &str) -> MergeOutcome {
        let Some(key) = MergeKey::from_name(&obs.name) else {
            warn!(university = %obs.university, group = group_title, "Card without a name, skipped");
            return MergeOutcome::Discarded;
        };

        let major = match obs.major_label.trim() {
            "" => group_title.trim().to_string(),
            label => label.to_string(),
        };
        let fields = dedup_in_order(
            obs.research_fields
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty()),
        );

        if let Some(&slot) = self.index.get(&key) {
            let entry = &mut self.pending[slot];
            let mut new_majors = 0;
            if !major.is_empty() && !entry.majors.contains(&major) {
                entry.majors.push(major);
                new_majors += 1;
            }
            let mut new_fields = 0;
            for field in fields {
                if !entry.research_fields.contains(&field) {
                    entry.research_fields.push(field);
                    new_fields += 1;
                }
            }
            fill_if_empty(&mut entry.h_index, obs.h_index);
            fill_if_empty(&mut entry.profile_url, obs.profile_url);
            fill_if_empty(&mut entry.email, obs.email);
            fill_if_empty(&mut entry.university, obs.university);

            info!(
                name = key.as_str(),
                majors = %entry.majors.join(", "),
                new_majors,
                new_fields,
                "Merged repeat observation"
            );
            return MergeOutcome::Merged { new_majors, new_fields };
        }

        info!(name = key.as_str(), major = %major, fields = fields.len(), "New professor");
        self.index.insert(key.clone(), self.pending.len());
        self.pending.push(PendingRecord {
            name: key.0,
            university: obs.university.trim().to_string(),
            majors: if major.is_empty() { Vec::new() } else { vec![major] },
            h_index: obs.h_index.trim().to_string(),
            profile_url: obs.profile_url.trim().to_string(),
            email: obs.email.trim().to_string(),
            research_fields: fields,
        });
        MergeOutcome::Created
    }

    /// Close the run: ids are assigned 1..N in first-seen order.
    pub fn finalize(self, scraped_at: &str) -> Vec<ProfessorRecord> {
        self.pending
            .into_iter()
            .enumerate()
            .map(|(i, p)| ProfessorRecord {
                id: i as u64 + 1,
                name: p.name,
                university: p.university,
                major: p.majors.join(", "),
                h_index: Some(p.h_index),
                profile_url: p.profile_url,
                email: p.email,
                research_fields: p.research_fields,
                scraped_at: Some(scraped_at.to_string()),
            })
            .collect()
    }
}

fn fill_if_empty(slot: &mut String, candidate: String) {
    let candidate = candidate.trim();
    if slot.is_empty() && !candidate.is_empty() {
        *slot = candidate.to_string();
    }
}
