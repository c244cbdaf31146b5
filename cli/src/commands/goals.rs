use anyhow::Result;

use intake_core::models::Goals;

use super::Service;
use super::helpers::parse_amount;
use crate::remote::{RemoteClient, mirror};

fn print_goals(goals: &Goals) {
    let p = goals.daily_protein_g;
    let w = goals.daily_water_l;
    println!("Daily protein: {p} g");
    println!("Daily water:   {w} L");
}

pub(crate) fn cmd_goals_show(svc: &Service, json: bool) -> Result<()> {
    let goals = svc.goals()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&goals)?);
    } else {
        print_goals(&goals);
    }
    Ok(())
}

pub(crate) async fn cmd_goals_set(
    svc: &Service,
    remote: Option<&RemoteClient>,
    protein: Option<String>,
    water: Option<String>,
    json: bool,
) -> Result<()> {
    let protein_g = protein
        .as_deref()
        .map(|p| parse_amount("Protein goal", p, "g"))
        .transpose()?;
    let water_l = water
        .as_deref()
        .map(|w| parse_amount("Water goal", w, "l"))
        .transpose()?;

    let goals = svc.set_goals(protein_g, water_l)?;
    if let Some(remote) = remote {
        mirror("goals", remote.save_goals(&goals)).await;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&goals)?);
    } else {
        print_goals(&goals);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::db::Database;
    use intake_core::service::IntakeService;

    #[tokio::test]
    async fn test_goals_set_partial() {
        let svc = IntakeService::new(Database::open_in_memory().unwrap());
        cmd_goals_set(&svc, None, None, Some("3000ml".to_string()), true)
            .await
            .unwrap();
        let goals = svc.goals().unwrap();
        assert!((goals.daily_protein_g - 160.0).abs() < f64::EPSILON);
        assert!((goals.daily_water_l - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_goals_set_requires_a_value() {
        let svc = IntakeService::new(Database::open_in_memory().unwrap());
        assert!(cmd_goals_set(&svc, None, None, None, false).await.is_err());
    }
}
