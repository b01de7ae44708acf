//! Starter agents seeded when a user picks their role.

use crate::types::{Agent, AgentRole, UserType};

fn agent(id: &str, name: &str, role: AgentRole, capabilities: &[&str]) -> Agent {
    Agent {
        id: id.to_string(),
        name: name.to_string(),
        role,
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        is_active: true,
    }
}

/// The fixed roster for `user_type`. Every roster has a secretary first and a
/// hiring manager second.
pub fn default_agents(user_type: UserType) -> Vec<Agent> {
    use AgentRole::*;

    match user_type {
        UserType::Ceo => vec![
            agent(
                "executive-secretary",
                "Executive Secretary",
                Secretary,
                &["task_delegation", "communication", "scheduling", "meeting_management"],
            ),
            agent(
                "hiring-manager",
                "Hiring Manager",
                HiringManager,
                &["agent_creation", "skill_assessment", "recruitment", "team_building"],
            ),
            agent(
                "strategy-consultant",
                "Strategy Consultant",
                Consultant,
                &["strategic_planning", "analysis", "reporting", "decision_support"],
            ),
        ],
        UserType::Student => vec![
            agent(
                "study-secretary",
                "Study Secretary",
                Secretary,
                &["task_delegation", "study_planning", "deadline_management"],
            ),
            agent(
                "tutor-manager",
                "Tutor Manager",
                HiringManager,
                &["agent_creation", "subject_assessment", "learning_support"],
            ),
            agent(
                "research-assistant",
                "Research Assistant",
                Assistant,
                &["research", "information_gathering", "citation_help", "fact_checking"],
            ),
        ],
        UserType::Tutor => vec![
            agent(
                "teaching-secretary",
                "Teaching Secretary",
                Secretary,
                &["task_delegation", "lesson_planning", "student_management"],
            ),
            agent(
                "curriculum-manager",
                "Curriculum Manager",
                HiringManager,
                &["agent_creation", "content_development", "assessment_creation"],
            ),
            agent(
                "content-creator",
                "Educational Content Creator",
                Creator,
                &["content_creation", "material_development", "quiz_generation"],
            ),
        ],
        UserType::Designer => vec![
            agent(
                "creative-secretary",
                "Creative Secretary",
                Secretary,
                &["task_delegation", "project_management", "client_communication"],
            ),
            agent(
                "creative-director",
                "Creative Director",
                HiringManager,
                &["agent_creation", "design_review", "creative_strategy"],
            ),
            agent(
                "asset-manager",
                "Asset Manager",
                Manager,
                &["asset_organization", "version_control", "file_management"],
            ),
        ],
        UserType::ContentCreator => vec![
            agent(
                "content-secretary",
                "Content Secretary",
                Secretary,
                &["task_delegation", "content_planning", "publishing_schedule"],
            ),
            agent(
                "brand-manager",
                "Brand Manager",
                HiringManager,
                &["agent_creation", "brand_consistency", "audience_analysis"],
            ),
            agent(
                "social-media-manager",
                "Social Media Manager",
                Manager,
                &["social_media_posting", "engagement_tracking", "hashtag_research"],
            ),
        ],
    }
}
