use crate::flight::CabinClass;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatPreference {
    Window,
    Aisle,
    Middle,
}

impl SeatPreference {
    fn letters(self) -> &'static [char] {
        match self {
            SeatPreference::Window => &['A', 'F'],
            SeatPreference::Aisle => &['C', 'D'],
            SeatPreference::Middle => &['B', 'E'],
        }
    }
}

/// Fixed cabin layout: rows and seat letters per class.
fn layout(cabin_class: CabinClass) -> (RangeInclusive<u32>, &'static [char]) {
    match cabin_class {
        CabinClass::FirstClass => (1..=2, &['A', 'B', 'C', 'D']),
        CabinClass::Business => (3..=8, &['A', 'B', 'C', 'D', 'E', 'F']),
        CabinClass::Economy | CabinClass::PremiumEconomy => (9..=35, &['A', 'B', 'C', 'D', 'E', 'F']),
    }
}

/// Split "12C" into (12, 'C').
fn parse_seat(code: &str) -> Option<(u32, char)> {
    let code = code.trim();
    let letter = code.chars().last()?;
    if !letter.is_ascii_alphabetic() {
        return None;
    }
    let row = code[..code.len() - letter.len_utf8()].parse::<u32>().ok()?;
    Some((row, letter.to_ascii_uppercase()))
}

/// Maps a cabin class and optional request or preference onto a concrete
/// seat code.
pub struct SeatAssigner;

impl SeatAssigner {
    /// Every seat in the class, ordered by row then letter.
    pub fn seats_for(cabin_class: CabinClass) -> Vec<String> {
        let (rows, letters) = layout(cabin_class);
        rows.flat_map(|row| letters.iter().map(move |letter| format!("{}{}", row, letter)))
            .collect()
    }

    /// Which cabin class a seat code belongs to, if any.
    pub fn cabin_of(seat: &str) -> Option<CabinClass> {
        let (row, letter) = parse_seat(seat)?;
        [CabinClass::FirstClass, CabinClass::Business, CabinClass::Economy]
            .into_iter()
            .find(|c| {
                let (rows, letters) = layout(*c);
                rows.contains(&row) && letters.contains(&letter)
            })
    }

    /// `occupied` holds every seat code already taken on the flight.
    pub fn assign(
        cabin_class: CabinClass,
        occupied: &HashSet<String>,
        requested: Option<&str>,
        preference: Option<SeatPreference>,
    ) -> Result<String, SeatAssignmentError> {
        if let Some(requested) = requested {
            return Self::assign_requested(cabin_class, occupied, requested);
        }

        let free: Vec<String> = Self::seats_for(cabin_class)
            .into_iter()
            .filter(|seat| !occupied.contains(seat))
            .collect();

        let preferred = preference.and_then(|pref| {
            free.iter()
                .find(|seat| seat.chars().last().is_some_and(|l| pref.letters().contains(&l)))
                .cloned()
        });

        preferred
            .or_else(|| free.first().cloned())
            .ok_or(SeatAssignmentError::NoSeatsAvailable(cabin_class))
    }

    fn assign_requested(
        cabin_class: CabinClass,
        occupied: &HashSet<String>,
        requested: &str,
    ) -> Result<String, SeatAssignmentError> {
        let (row, letter) =
            parse_seat(requested).ok_or_else(|| SeatAssignmentError::InvalidSeat(requested.to_string()))?;
        let seat = format!("{}{}", row, letter);

        if occupied.contains(&seat) {
            return Err(SeatAssignmentError::SeatTaken(seat));
        }

        let (rows, letters) = layout(cabin_class);
        if !rows.contains(&row) {
            return Err(SeatAssignmentError::WrongCabinClass { seat, cabin_class });
        }
        if !letters.contains(&letter) {
            return Err(SeatAssignmentError::InvalidSeat(seat));
        }

        Ok(seat)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SeatAssignmentError {
    #[error("Seat {0} is already taken")]
    SeatTaken(String),

    #[error("Seat {seat} is not in the {cabin_class} cabin")]
    WrongCabinClass { seat: String, cabin_class: CabinClass },

    #[error("Invalid seat code: {0}")]
    InvalidSeat(String),

    #[error("No {0} seats left to assign")]
    NoSeatsAvailable(CabinClass),
}
