pub fn build_extraction_prompt(text: &str) -> String {
    format!(
        r#"Extract entities and relationships from the following text.

ENTITY TYPES:
- PERSON: People mentioned by name
- ORG: Companies, organizations, institutions
- TECHNOLOGY: Programming languages, frameworks, tools, libraries
- CONCEPT: Technical concepts, methodologies, ideas
- LOCATION: Places, countries, cities
- DATE: Specific dates or time periods

RELATIONSHIP TYPES:
- RELATED_TO: General relationship
- CREATED_BY: Something was created or founded by someone
- WORKS_AT: Person works at organization
- USES: Something uses or depends on something else
- PART_OF: Something is part of something larger

TEXT:
{}

Respond ONLY with valid JSON in this exact format:
{{
  "entities": [
    {{"name": "entity name", "type": "TYPE", "description": "brief description"}}
  ],
  "relations": [
    {{"from": "entity1 name", "to": "entity2 name", "relation": "RELATION_TYPE"}}
  ]
}}

RULES:
- Normalize entity names ("Python", not "python language")
- Only extract clearly mentioned entities
- Keep descriptions brief (max 20 words)
- Only include confident relations
- Return empty arrays if no entities are found"#,
        text
    )
}
