//! Build recipe generation.
//!
//! Pure mapping from a stack type to the Dockerfile text used to package
//! it. One fixed template per stack; the stack's default port is embedded
//! in both the `EXPOSE` and `ENV PORT` directives so the published host
//! port always reaches the in-container listener.

use crate::engine::models::StackType;
use crate::errors::EngineError;

/// A generated build/run definition for one stack type.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub dockerfile: String,
    pub listen_port: u16,
}

/// Produce the recipe for `stack`. No network or filesystem access.
pub fn for_stack(stack: StackType) -> Result<Recipe, EngineError> {
    let port = stack
        .default_port()
        .ok_or_else(|| EngineError::UnsupportedProject {
            reason: format!("no build recipe for stack '{}'", stack),
        })?;

    let dockerfile = match stack {
        StackType::Node => node_dockerfile(port),
        StackType::Python => python_dockerfile(port),
        StackType::JavaMaven => maven_dockerfile(port),
        StackType::JavaGradle => gradle_dockerfile(port),
        StackType::Go => go_dockerfile(port),
        StackType::Unsupported => unreachable!("filtered by default_port"),
    };

    Ok(Recipe {
        dockerfile,
        listen_port: port,
    })
}

fn node_dockerfile(port: u16) -> String {
    format!(
        r#"FROM node:20-slim
WORKDIR /app
COPY package.json ./
RUN npm install --omit=dev
COPY . .
ENV PORT={port}
EXPOSE {port}
CMD ["sh", "-c", "npm start || node index.js"]
"#
    )
}

fn python_dockerfile(port: u16) -> String {
    format!(
        r#"FROM python:3.12-slim
WORKDIR /app
COPY requirements.txt ./
RUN pip install --no-cache-dir -r requirements.txt
COPY . .
ENV PORT={port}
EXPOSE {port}
CMD ["sh", "-c", "if [ -f app.py ]; then exec python app.py; else exec python main.py; fi"]
"#
    )
}

fn maven_dockerfile(port: u16) -> String {
    format!(
        r#"FROM maven:3.9-eclipse-temurin-21
WORKDIR /app
COPY . .
RUN mvn -q package -DskipTests
ENV PORT={port}
EXPOSE {port}
CMD ["sh", "-c", "exec java -jar target/*.jar"]
"#
    )
}

fn gradle_dockerfile(port: u16) -> String {
    format!(
        r#"FROM gradle:8-jdk21
WORKDIR /app
COPY . .
RUN gradle build -x test --no-daemon
ENV PORT={port}
EXPOSE {port}
CMD ["sh", "-c", "exec java -jar build/libs/*.jar"]
"#
    )
}

fn go_dockerfile(port: u16) -> String {
    format!(
        r#"FROM golang:1.22-alpine
WORKDIR /app
COPY go.* ./
RUN go mod download
COPY . .
RUN go build -o /usr/local/bin/app .
ENV PORT={port}
EXPOSE {port}
CMD ["app"]
"#
    )
}
