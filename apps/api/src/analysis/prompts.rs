// Prompt templates for the four analysis dimensions.
// Placeholders: {resume_text}, {job_text}, {language_instruction}.

pub const ANALYSIS_SYSTEM: &str = "You are an experienced technical recruiter who compares \
    a candidate's resume with a job posting honestly and concretely. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

pub const HEADLINE_PROMPT_TEMPLATE: &str = r#"HEADLINE MATCH ANALYSIS

Compare the candidate's headline / current title with the title of the job posting.
Judge whether a recruiter skimming the resume would see this person as a fit for this role.

{language_instruction}

Return a JSON object with this EXACT schema:
{
  "score": 0-100,
  "explanation": "two or three sentences",
  "resume_title": "title as written on the resume",
  "job_title": "title as written in the posting",
  "problems": ["concrete mismatch"],
  "recommendations": ["concrete headline change"]
}

RESUME:
{resume_text}

JOB POSTING:
{job_text}"#;

pub const SKILLS_PROMPT_TEMPLATE: &str = r#"SKILLS GAP ANALYSIS

List the hard and soft skills the job posting asks for, and check each one against the resume.
A skill only counts as matched if the resume gives evidence of it.

{language_instruction}

Return a JSON object with this EXACT schema:
{
  "score": 0-100,
  "explanation": "two or three sentences",
  "matched_skills": ["skill"],
  "missing_skills": ["skill"],
  "problems": ["missing or weakly evidenced skill"],
  "recommendations": ["how to close or surface the gap"]
}

RESUME:
{resume_text}

JOB POSTING:
{job_text}"#;

pub const EXPERIENCE_PROMPT_TEMPLATE: &str = r#"EXPERIENCE MATCH ANALYSIS

Compare the candidate's years of relevant experience, seniority and scope of responsibility
with what the job posting requires.

{language_instruction}

Return a JSON object with this EXACT schema:
{
  "score": 0-100,
  "explanation": "two or three sentences",
  "candidate_years": 0,
  "required_years": 0,
  "seniority_fit": "under-qualified | matched | over-qualified",
  "problems": ["experience gap"],
  "recommendations": ["how to present experience better"]
}

RESUME:
{resume_text}

JOB POSTING:
{job_text}"#;

pub const LOGISTICS_PROMPT_TEMPLATE: &str = r#"LOGISTICS AND CONDITIONS ANALYSIS

Compare location, relocation, remote/hybrid/office format, salary expectations, schedule
and employment type between the resume and the job posting. Where the resume is silent,
say so instead of guessing.

{language_instruction}

Return a JSON object with this EXACT schema:
{
  "score": 0-100,
  "explanation": "two or three sentences",
  "location": "short note",
  "work_format": "short note",
  "salary": "short note",
  "schedule": "short note",
  "problems": ["conflicting condition"],
  "recommendations": ["what to clarify with the employer"]
}

RESUME:
{resume_text}

JOB POSTING:
{job_text}"#;
