extern crate serde_json;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

pub mod config;
pub mod error;
pub mod lump;
pub mod model_checking;

use error::{ImdpError, Result};
use model_checking::imdp::{Imdp, ImdpBuilder};

#[derive(Debug, Deserialize)]
pub struct SuccessorInput {
    pub s: usize,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceInput {
    pub s: usize,
    #[serde(default)]
    pub a: String,
    #[serde(default)]
    pub reward: f64,
    pub s_prime: Vec<SuccessorInput>,
}

/// Interval MDP as stored on disk. `target` lists state ids, `stop_rewards`
/// is either empty or holds one reward per state.
#[derive(Debug, Deserialize)]
pub struct ImdpInput {
    pub num_states: usize,
    #[serde(default)]
    pub initial: usize,
    pub choices: Vec<ChoiceInput>,
    #[serde(default)]
    pub target: Vec<usize>,
    #[serde(default)]
    pub stop_rewards: Vec<f64>,
}

/// A loaded model: the graph plus everything the objectives refer to.
/// `rewards` and `labels` are indexed by choice of `graph`.
#[derive(Debug, Clone)]
pub struct Model {
    pub graph: Imdp,
    pub initial: usize,
    pub rewards: Vec<f64>,
    pub labels: Vec<String>,
    pub target: Vec<bool>,
    pub stop_rewards: Vec<f64>,
}

impl ImdpInput {
    pub fn build(&self) -> Result<Model> {
        let n = self.num_states;
        if self.initial >= n {
            return Err(ImdpError::invalid_model(format!("initial state {} out of range", self.initial)));
        }
        let mut target = vec![false; n];
        for &s in self.target.iter() {
            if s >= n {
                return Err(ImdpError::invalid_model(format!("target state {} out of range", s)));
            }
            target[s] = true;
        }
        let stop_rewards = if self.stop_rewards.is_empty() {
            vec![0.0; n]
        } else if self.stop_rewards.len() == n {
            self.stop_rewards.clone()
        } else {
            return Err(ImdpError::invalid_model(format!(
                "{} stop rewards for {} states",
                self.stop_rewards.len(),
                n
            )));
        };
        // choices of one state keep their file order
        let mut choices: Vec<&ChoiceInput> = self.choices.iter().collect();
        choices.sort_by_key(|c| c.s);
        let mut builder = ImdpBuilder::new(n);
        let mut labels = Vec::with_capacity(choices.len());
        for choice in choices {
            builder.add_choice_with_reward(choice.s, choice.reward)?;
            for succ in choice.s_prime.iter() {
                builder.add_transition(succ.s, succ.lower, succ.upper)?;
            }
            labels.push(choice.a.clone());
        }
        let (graph, rewards) = builder.build_with_rewards()?;
        Ok(Model {
            graph,
            initial: self.initial,
            rewards,
            labels,
            target,
            stop_rewards,
        })
    }
}

pub fn read_imdp_json<P: AsRef<Path>>(path: P) -> Result<Model> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let u: ImdpInput = serde_json::from_reader(reader)?;
    u.build()
}

pub fn parse_imdp_json(input: &str) -> Result<Model> {
    let u: ImdpInput = serde_json::from_str(input)?;
    u.build()
}
