//! Deterministic local answers: time, date, greetings, small talk.
//! No network; each intent draws from a small fixed pool, never empty.

use chrono::{DateTime, Local, TimeZone};
use rand::seq::SliceRandom;

use crate::intent::LocalIntent;

const GREETINGS: &[&str] = &[
    "Hello! What can I help you with?",
    "Hi there! Ready when you are.",
    "Hey! What would you like to do?",
];

const HOW_ARE_YOU: &[&str] = &[
    "I'm doing great, thanks for asking! How can I help you stay focused?",
    "All systems running smoothly. What's on your list today?",
    "I'm good! Ready to help you get things done.",
];

const THANKS: &[&str] = &[
    "You're welcome!",
    "Happy to help!",
    "Anytime. Keep up the good work!",
];

pub struct LocalResponder;

impl LocalResponder {
    pub fn respond(&self, intent: LocalIntent) -> String {
        self.respond_at(intent, &Local::now())
    }

    pub fn respond_at<Tz: TimeZone>(&self, intent: LocalIntent, now: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        match intent {
            LocalIntent::Time => format!("It's {}.", now.format("%-I:%M %p")),
            LocalIntent::Date => format!("Today is {}.", now.format("%A, %B %-d, %Y")),
            LocalIntent::Greeting => pick(GREETINGS),
            LocalIntent::HowAreYou => pick(HOW_ARE_YOU),
            LocalIntent::Thanks => pick(THANKS),
        }
    }
}

fn pick(pool: &[&str]) -> String {
    pool.choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Okay.")
        .to_string()
}
