//! Food tracking tools.
//!
//! Tools exposed to the model:
//! - `consumed_food { food_name, calories?, protein?, carbs?, fats? }`: log one entry
//! - `get_daily_totals {}`: today's calories and macros for the participant
//!
//! Replies are phrased to be spoken, never shown.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use crate::store::{DailyTotals, NewConsumption, Nutrients};
use crate::tools::{ParamType, ToolArgs, ToolContext, ToolDescriptor, ToolRegistry};

pub const CONSUMED_FOOD: &str = "consumed_food";
pub const GET_DAILY_TOTALS: &str = "get_daily_totals";

/// Reply when nothing was logged in the current day window.
pub const NO_FOOD_TODAY: &str = "No food logged today.";

pub fn consumed_food_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(CONSUMED_FOOD, "Record food consumption in the database")
        .required("food_name", ParamType::String, "The name of the food consumed")
        .optional("calories", ParamType::Number, "The number of calories in the food")
        .optional("protein", ParamType::Number, "Grams of protein in the food")
        .optional("carbs", ParamType::Number, "Grams of carbohydrates in the food")
        .optional("fats", ParamType::Number, "Grams of fat in the food")
}

pub fn daily_totals_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        GET_DAILY_TOTALS,
        "Get the total calories and macronutrients consumed today",
    )
}

/// Register both food tools.
pub fn register(registry: &mut ToolRegistry) -> anyhow::Result<()> {
    registry.register(
        consumed_food_descriptor(),
        Arc::new(|args, ctx| Box::pin(async move { consumed_food(args, ctx).await })),
    )?;
    registry.register(
        daily_totals_descriptor(),
        Arc::new(|args, ctx| Box::pin(async move { get_daily_totals(args, ctx).await })),
    )?;
    Ok(())
}

/// `consumed_food` tool: append an entry for the session's participant.
pub async fn consumed_food(args: ToolArgs, ctx: ToolContext) -> anyhow::Result<String> {
    let food_name = args
        .text("food_name")
        .ok_or_else(|| anyhow::anyhow!("consumed_food requires 'food_name'"))?
        .to_string();
    let nutrients = Nutrients {
        calories: args.number("calories"),
        protein: args.number("protein"),
        carbs: args.number("carbs"),
        fats: args.number("fats"),
    };

    tracing::debug!(food = %food_name, participant = %ctx.participant_identity, "recording consumption");

    ctx.store
        .append(NewConsumption {
            food_name: food_name.clone(),
            participant_identity: ctx.participant_identity.clone(),
            nutrients,
        })
        .await
        .context("failed to record food consumption")?;

    Ok(recorded_reply(&food_name, &nutrients))
}

/// `get_daily_totals` tool: sum today's entries for the session's participant.
pub async fn get_daily_totals(_args: ToolArgs, ctx: ToolContext) -> anyhow::Result<String> {
    let window = ctx.day_zone.window(Utc::now());
    let totals = ctx
        .store
        .aggregate_daily(&ctx.participant_identity, window.start, window.end)
        .await
        .context("failed to get daily nutrition totals")?;
    Ok(totals_reply(&totals))
}

/// `Say: I've recorded that you ate <food> (<supplied nutrients>).`
pub fn recorded_reply(food_name: &str, n: &Nutrients) -> String {
    let parts: Vec<String> = [
        n.calories.map(|v| format!("{} calories", number(v))),
        n.protein.map(|v| format!("{}g protein", number(v))),
        n.carbs.map(|v| format!("{}g carbs", number(v))),
        n.fats.map(|v| format!("{}g fat", number(v))),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        format!("Say: I've recorded that you ate {food_name}.")
    } else {
        format!(
            "Say: I've recorded that you ate {food_name} ({}).",
            parts.join(", ")
        )
    }
}

pub fn totals_reply(t: &DailyTotals) -> String {
    if t.entries == 0 {
        return NO_FOOD_TODAY.to_string();
    }
    format!(
        "Today's totals: {} calories, {:.1}g protein, {:.1}g carbs, {:.1}g fat.",
        t.calories.round() as i64,
        one_decimal(t.protein),
        one_decimal(t.carbs),
        one_decimal(t.fats),
    )
}

/// Shortest form: `70`, `10.25`.
fn number(v: f64) -> String {
    format!("{v}")
}

/// Half-away-from-zero to one decimal (`10.25` → `10.3`).
fn one_decimal(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
