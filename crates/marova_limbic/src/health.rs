//! Health scoring from a lifestyle survey.
//!
//! The score feeds the aggregator through `DnaProfile::health_score`; the
//! bucket is only a coarse label for display.

use marova_core::{clamp, HealthBucket, HealthSurvey};

#[derive(Debug, Clone, PartialEq)]
pub struct HealthEvaluation {
    pub score: u8,
    pub bucket: HealthBucket,
    pub summary: String,
    /// Sorted, de-duplicated risk tags
    pub risks: Vec<String>,
}

pub fn evaluate_health_survey(survey: &HealthSurvey) -> HealthEvaluation {
    let mut score = 40.0;
    let mut insights: Vec<&'static str> = Vec::new();
    let mut risks: Vec<&'static str> = Vec::new();

    let sleep = survey.sleep_hours;
    if (7.0..=9.0).contains(&sleep) {
        score += 15.0;
        insights.push("Sleep duration sits within the optimal 7-9 hour band.");
    } else if (6.0..7.0).contains(&sleep) || (sleep > 9.0 && sleep <= 10.0) {
        score += 10.0;
        insights.push("Sleep is near the optimal range.");
    } else if (5.0..6.0).contains(&sleep) || (sleep > 10.0 && sleep <= 11.0) {
        score += 5.0;
        risks.push("sleep_irregularity");
        insights.push("Sleep duration drifts from ideal targets.");
    } else {
        risks.push("sleep_deficit");
        insights.push("Significant sleep disruption detected.");
    }

    let activity = (survey.exercise_minutes_per_week as f64 / 210.0).min(1.0);
    score += 18.0 * activity;
    if activity < 0.5 {
        risks.push("low_activity");
        insights.push("Weekly activity is low.");
    }

    score += ((survey.diet_quality as f64 - 1.0) / 4.0) * 16.0;
    if survey.diet_quality <= 2 {
        risks.push("dietary_risk");
        insights.push("Diet quality trending low.");
    }

    score += 12.0 * ((6.0 - survey.stress_level as f64) / 5.0);
    if survey.stress_level >= 4 {
        risks.push("elevated_stress");
        insights.push("Heightened stress levels recorded.");
    }

    if survey.chronic_condition {
        score -= 10.0;
        risks.push("chronic_condition");
        insights.push("Chronic condition disclosed.");
    } else {
        score += 2.0;
    }

    match survey.alcohol_units_per_week {
        0..=7 => score += 4.0,
        8..=14 => score += 1.0,
        _ => {
            score -= 6.0;
            risks.push("alcohol_load");
            insights.push("Alcohol intake exceeds recommended bounds.");
        }
    }

    if survey.smoker {
        score -= 12.0;
        risks.push("tobacco_exposure");
        insights.push("Nicotine exposure detected.");
    } else {
        score += 3.0;
    }

    score += 6.0 * (survey.meditation_minutes_per_week as f64 / 180.0).min(1.0);

    let hydration = survey.hydration_liters_per_day;
    if hydration >= 2.5 {
        score += 6.0;
    } else if hydration >= 1.5 {
        score += 3.0;
    } else {
        risks.push("low_hydration");
        insights.push("Hydration falls below 1.5L a day.");
    }

    let score = clamp(score, 0.0, 100.0).round() as u8;
    risks.sort_unstable();
    risks.dedup();

    HealthEvaluation {
        score,
        bucket: HealthBucket::from_score(score),
        summary: insights.join(" "),
        risks: risks.into_iter().map(String::from).collect(),
    }
}
